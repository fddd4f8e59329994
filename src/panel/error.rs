/*
 *  panel/error.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Error types for the panel subsystem
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

use std::error::Error;
use std::fmt;

/// Unified error type for panel operations.
///
/// A `Timeout` from a busy-wait leaves the controller in an undefined state;
/// callers treat any subsequent failure as a directive to reinitialize.
#[derive(Debug)]
pub enum PanelError {
    /// Framebuffer allocation failed
    AllocFail,

    /// SPI/GPIO transfer failed
    BusFail(String),

    /// Hardware reset did not release the BUSY line in time
    ResetTimeout,

    /// A busy-wait deadline expired
    Timeout { waited_ms: u64 },

    /// Bad coordinates or malformed buffer
    InvalidArgument(String),
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelError::AllocFail =>
                write!(f, "Failed to allocate framebuffer"),
            PanelError::BusFail(msg) =>
                write!(f, "Panel bus error: {}", msg),
            PanelError::ResetTimeout =>
                write!(f, "Panel did not come out of reset"),
            PanelError::Timeout { waited_ms } =>
                write!(f, "Panel busy-wait timed out after {} ms", waited_ms),
            PanelError::InvalidArgument(msg) =>
                write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl Error for PanelError {}
