/*
 *  canvas/model.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Scene model - canvases and their elements
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

use crate::panel::Color;

/// Maximum elements a canvas may hold.
pub const MAX_ELEMENTS: usize = 50;

/// Maximum canvas/element/image id length in bytes.
pub const MAX_ID_LEN: usize = 31;

/// Maximum canvas name length in bytes.
pub const MAX_NAME_LEN: usize = 63;

/// Maximum text payload of a text element.
pub const MAX_TEXT_LEN: usize = 511;

/// Maximum stored image size.
pub const MAX_IMAGE_SIZE: usize = 64 * 1024;

/// Element bounding box. Position may be negative (partially off-panel);
/// clipping happens at draw time, never at store time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i16,
    pub y: i16,
    pub w: u16,
    pub h: u16,
}

/// Text alignment inside the element bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TextAlign {
    Left = 0,
    Center = 1,
    Right = 2,
}

impl From<TextAlign> for u8 {
    fn from(a: TextAlign) -> u8 {
        a as u8
    }
}

impl TryFrom<u8> for TextAlign {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(TextAlign::Left),
            1 => Ok(TextAlign::Center),
            2 => Ok(TextAlign::Right),
            _ => Err(format!("invalid text alignment {}", v)),
        }
    }
}

/// The four supported font sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum FontSize {
    Small = 12,
    Medium = 16,
    Large = 24,
    XLarge = 32,
}

impl FontSize {
    pub fn px(self) -> u16 {
        self as u16
    }

    pub fn from_px(v: u8) -> Option<Self> {
        match v {
            12 => Some(FontSize::Small),
            16 => Some(FontSize::Medium),
            24 => Some(FontSize::Large),
            32 => Some(FontSize::XLarge),
            _ => None,
        }
    }
}

impl From<FontSize> for u8 {
    fn from(s: FontSize) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for FontSize {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        FontSize::from_px(v).ok_or_else(|| format!("invalid font size {}", v))
    }
}

/// Stored image encodings. Decode is a future concern; the format tag is
/// persisted alongside the bytes so a decoder can pick it up later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ImageFormat {
    Bmp = 0,
    Png = 1,
    Jpg = 2,
}

impl ImageFormat {
    /// Detect a format from the leading magic bytes. Anything unrecognized
    /// is treated as BMP, matching the upload handler's behavior.
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= 4 && data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47
        {
            ImageFormat::Png
        } else if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
            ImageFormat::Jpg
        } else {
            ImageFormat::Bmp
        }
    }
}

impl From<ImageFormat> for u8 {
    fn from(f: ImageFormat) -> u8 {
        f as u8
    }
}

impl TryFrom<u8> for ImageFormat {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ImageFormat::Bmp),
            1 => Ok(ImageFormat::Png),
            2 => Ok(ImageFormat::Jpg),
            _ => Err(format!("invalid image format {}", v)),
        }
    }
}

/// Text element properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProps {
    pub text: String,
    pub font_size: FontSize,
    pub color: Color,
    pub align: TextAlign,
    pub bold: bool,
    pub italic: bool,
}

/// Image element properties. `maintain_aspect` and `opacity` are advisory
/// for future decoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProps {
    pub image_id: String,
    pub format: ImageFormat,
    #[serde(rename = "maintain_aspect_ratio")]
    pub maintain_aspect: bool,
    pub opacity: u8,
}

/// Shape element properties, shared by Rect/Line/Circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeProps {
    pub fill_color: Color,
    pub border_color: Color,
    pub border_width: u8,
    pub filled: bool,
}

/// The element sum type. The shape sub-kind is carried in the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Text(TextProps),
    Image(ImageProps),
    Rect(ShapeProps),
    Line(ShapeProps),
    Circle(ShapeProps),
}

impl ElementKind {
    /// The numeric wire tag used by the JSON schema.
    pub fn type_tag(&self) -> u8 {
        match self {
            ElementKind::Text(_) => 0,
            ElementKind::Image(_) => 1,
            ElementKind::Rect(_) => 2,
            ElementKind::Line(_) => 3,
            ElementKind::Circle(_) => 4,
        }
    }
}

/// A drawable entity in a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: String,
    pub bounds: Bounds,
    pub z_index: u8,
    pub visible: bool,
    pub kind: ElementKind,
}

/// A named, persisted scene of up to [`MAX_ELEMENTS`] elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub id: String,
    pub name: String,
    pub background_color: Color,
    pub created_time: u32,
    pub modified_time: u32,
    pub elements: Vec<Element>,
}

impl Canvas {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            background_color: Color::White,
            created_time: now,
            modified_time: now,
            elements: Vec::new(),
        }
    }

    pub fn element(&self, element_id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == element_id)
    }

    pub fn element_index(&self, element_id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == element_id)
    }
}

/// Validate an id field (canvas, element or image id).
pub fn validate_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_format_detection() {
        assert_eq!(ImageFormat::detect(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), ImageFormat::Png);
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpg);
        assert_eq!(ImageFormat::detect(&[0x42, 0x4D, 0x00]), ImageFormat::Bmp);
        assert_eq!(ImageFormat::detect(&[]), ImageFormat::Bmp);
    }

    #[test]
    fn test_font_size_values() {
        assert_eq!(FontSize::from_px(16), Some(FontSize::Medium));
        assert_eq!(FontSize::from_px(20), None);
        assert_eq!(FontSize::XLarge.px(), 32);
    }

    #[test]
    fn test_id_validation() {
        assert!(validate_id("clock"));
        assert!(!validate_id(""));
        assert!(validate_id(&"a".repeat(31)));
        assert!(!validate_id(&"a".repeat(32)));
    }

    #[test]
    fn test_element_lookup() {
        let mut canvas = Canvas::new("c", "Canvas", 0);
        canvas.elements.push(Element {
            id: "e1".to_string(),
            bounds: Bounds { x: 0, y: 0, w: 10, h: 10 },
            z_index: 0,
            visible: true,
            kind: ElementKind::Rect(ShapeProps {
                fill_color: Color::Red,
                border_color: Color::Black,
                border_width: 0,
                filled: true,
            }),
        });
        assert!(canvas.element("e1").is_some());
        assert!(canvas.element("e2").is_none());
        assert_eq!(canvas.element_index("e1"), Some(0));
    }
}
