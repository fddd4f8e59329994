/*
 *  panel/commands.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  FPC-A005 controller command set
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

//! Command bytes understood by the FPC-A005 e-paper controller.
//!
//! Only a subset is used by the driver; the full table is kept so the wire
//! protocol is documented in one place.

pub const PANEL_SETTING: u8 = 0x00;
pub const POWER_SETTING: u8 = 0x01;
pub const POWER_OFF: u8 = 0x02;
pub const POWER_OFF_SEQUENCE: u8 = 0x03;
pub const POWER_ON: u8 = 0x04;
pub const POWER_ON_MEASURE: u8 = 0x05;
pub const BOOSTER_SOFT_START: u8 = 0x06;
pub const DEEP_SLEEP: u8 = 0x07;
pub const DATA_START_TRANSMISSION_1: u8 = 0x10;
pub const DATA_STOP: u8 = 0x11;
pub const DISPLAY_REFRESH: u8 = 0x12;
pub const IMAGE_PROCESS: u8 = 0x13;
pub const PLL_CONTROL: u8 = 0x30;
pub const TEMPERATURE_CALIBRATION: u8 = 0x40;
pub const TEMPERATURE_SELECTION: u8 = 0x41;
pub const VCOM_DATA_INTERVAL: u8 = 0x50;
pub const LOW_POWER_DETECTION: u8 = 0x51;
pub const TCON_SETTING: u8 = 0x60;
pub const TCON_RESOLUTION: u8 = 0x61;
pub const SPI_FLASH_CONTROL: u8 = 0x65;
pub const REVISION: u8 = 0x70;
pub const GET_STATUS: u8 = 0x71;
pub const AUTO_MEASUREMENT_VCOM: u8 = 0x80;
pub const READ_VCOM: u8 = 0x81;
pub const VCM_DC_SETTING: u8 = 0x82;
pub const PARTIAL_WINDOW: u8 = 0x90;
pub const PARTIAL_IN: u8 = 0x91;
pub const PARTIAL_OUT: u8 = 0x92;
pub const POWER_SAVING: u8 = 0xE3;

/// Check byte required by the DEEP_SLEEP command.
pub const DEEP_SLEEP_MAGIC: u8 = 0xA5;
