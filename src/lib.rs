/*
 *  lib.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Library root - firmware runtime for the PinFrame e-paper display
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

//! On-device runtime for a battery-powered seven-color e-paper display:
//! panel driver and rasterizer, persisted canvas scenes, a sandboxed
//! plugin runtime, Wi-Fi provisioning, OTA updates, and the HTTP handler
//! surface of the configuration web app.
//!
//! Hardware seams (SPI bus, radio, bootloader slot, battery ADC, HTTP
//! server front-end) are traits implemented by the platform layer.

pub mod config;
pub mod store;

pub mod panel;
pub mod canvas;
pub mod display_service;

pub mod plugins;
pub mod wifi;
pub mod ota;
pub mod web;

pub use display_service::{DisplayPolicy, DisplayService};
pub use panel::{Color, FrameBuffer, PanelDriver, RefreshMode};
