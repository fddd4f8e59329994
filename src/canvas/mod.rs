/*
 *  canvas/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Canvas engine - persisted scenes, JSON schema, rasterization
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

pub mod model;
pub mod json;
pub mod render;
pub mod engine;

pub use engine::{CanvasEngine, CanvasError};
pub use model::{
    Bounds, Canvas, Element, ElementKind, FontSize, ImageFormat, ImageProps, ShapeProps,
    TextAlign, TextProps, MAX_ELEMENTS, MAX_IMAGE_SIZE,
};
