/*
 *  ota/mod.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  OTA update engine - manifest check, streaming install, rollback
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

pub mod manifest;
pub mod slot;
pub mod engine;

pub use engine::{OtaEngine, OtaState, OtaStatus};
pub use manifest::{parse_manifest, UpdateInfo};
pub use slot::{MockSlot, OtaSlot};

use std::fmt;

/// Error type for OTA operations.
#[derive(Debug)]
pub enum OtaError {
    /// Manifest unreachable or malformed
    Manifest(String),

    /// No firmware asset in the release
    NoAsset,

    /// Operation invalid for the current state
    InvalidState(String),

    /// Download transport failed
    Http(String),

    /// Slot write failed
    Slot(String),

    /// Image validation failed at commit
    IntegrityFail(String),

    /// Install aborted by the cancellation flag
    Cancelled,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::Manifest(msg) => write!(f, "Update manifest error: {}", msg),
            OtaError::NoAsset => write!(f, "No firmware binary found in release"),
            OtaError::InvalidState(msg) => write!(f, "Invalid OTA state: {}", msg),
            OtaError::Http(msg) => write!(f, "Update download failed: {}", msg),
            OtaError::Slot(msg) => write!(f, "Update slot write failed: {}", msg),
            OtaError::IntegrityFail(msg) => write!(f, "Image validation failed: {}", msg),
            OtaError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for OtaError {}
