/*
 *  panel/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Panel subsystem - FPC-A005 e-paper driver, framebuffer and rasterizer
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

pub mod color;
pub mod commands;
pub mod error;
pub mod bus;
pub mod framebuffer;
pub mod driver;

// Re-exports for convenience
pub use color::Color;
pub use error::PanelError;
pub use bus::{PanelBus, MockBus};
pub use framebuffer::FrameBuffer;
pub use driver::{PanelDriver, RefreshMode};

/// Panel width in pixels
pub const PANEL_WIDTH: u16 = 600;

/// Panel height in pixels
pub const PANEL_HEIGHT: u16 = 448;

/// Framebuffer size in bytes (two pixels per byte)
pub const BUFFER_SIZE: usize = (PANEL_WIDTH as usize * PANEL_HEIGHT as usize) / 2;
