/*
 *  panel/color.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Seven-color palette of the FPC-A005 panel
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};

/// One of the seven colors the panel can produce.
///
/// The controller encodes each pixel as a 4-bit value; the framebuffer packs
/// two pixels per byte with the even-x pixel in the high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Color {
    Black = 0x0,
    White = 0x1,
    Red = 0x2,
    Yellow = 0x3,
    Blue = 0x4,
    Green = 0x5,
    Orange = 0x6,
}

impl Color {
    /// The 4-bit wire value for this color.
    pub fn nibble(self) -> u8 {
        self as u8
    }

    /// Decode a 4-bit value. Values above 0x6 are not panel colors.
    pub fn from_nibble(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x0 => Some(Color::Black),
            0x1 => Some(Color::White),
            0x2 => Some(Color::Red),
            0x3 => Some(Color::Yellow),
            0x4 => Some(Color::Blue),
            0x5 => Some(Color::Green),
            0x6 => Some(Color::Orange),
            _ => None,
        }
    }

    /// Both nibbles of a byte set to this color, the fill pattern used by
    /// `clear()`.
    pub fn fill_byte(self) -> u8 {
        (self.nibble() << 4) | self.nibble()
    }
}

impl From<Color> for u8 {
    fn from(c: Color) -> u8 {
        c.nibble()
    }
}

impl TryFrom<u8> for Color {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Color::from_nibble(value).ok_or_else(|| format!("invalid panel color value {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_round_trip() {
        for v in 0u8..=6 {
            let c = Color::from_nibble(v).unwrap();
            assert_eq!(c.nibble(), v);
        }
        assert!(Color::from_nibble(7).is_none());
        assert!(Color::from_nibble(0x0F).is_none());
    }

    #[test]
    fn test_fill_byte() {
        assert_eq!(Color::White.fill_byte(), 0x11);
        assert_eq!(Color::Black.fill_byte(), 0x00);
        assert_eq!(Color::Orange.fill_byte(), 0x66);
    }

    #[test]
    fn test_serde_as_integer() {
        let c: Color = serde_json::from_str("4").unwrap();
        assert_eq!(c, Color::Blue);
        assert_eq!(serde_json::to_string(&Color::Red).unwrap(), "2");
        assert!(serde_json::from_str::<Color>("9").is_err());
    }
}
