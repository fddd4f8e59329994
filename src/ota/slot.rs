/*
 *  ota/slot.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Bootloader-slot abstraction for rollback-safe installs
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

use std::sync::{Arc, Mutex};

use log::info;

use crate::ota::OtaError;

/// Seam over the bootloader's A/B partition scheme.
///
/// The alternate slot ignores partial writes until `finish` validates and
/// commits them, so a torn download can never brick the device. The
/// running image starts in a pending-verify state after an update and is
/// confirmed by `mark_valid` on the next healthy boot.
pub trait OtaSlot: Send + Sync {
    /// Whether the running image is awaiting boot confirmation.
    fn pending_verify(&self) -> bool;

    /// Confirm the running image.
    fn mark_valid(&self) -> Result<(), OtaError>;

    /// Invalidate the running image and reboot into the previous slot.
    fn mark_invalid_and_reboot(&self) -> Result<(), OtaError>;

    /// Open the alternate slot for a streaming write.
    fn begin(&self, total_size: u64) -> Result<(), OtaError>;

    /// Append one downloaded chunk.
    fn write(&self, chunk: &[u8]) -> Result<(), OtaError>;

    /// Validate and commit the written image.
    fn finish(&self) -> Result<(), OtaError>;

    /// Discard the partial write, leaving the slot un-committed.
    fn abort(&self);

    /// Restart into whatever the bootloader selects.
    fn reboot(&self);
}

/// In-memory slot double for tests and host builds without a bootloader.
pub struct MockSlot {
    state: Arc<Mutex<MockSlotState>>,
}

#[derive(Debug, Default)]
pub struct MockSlotState {
    pub pending_verify: bool,
    pub valid_marks: u32,
    pub invalidated: bool,
    pub begun: bool,
    pub expected_size: u64,
    pub written: Vec<u8>,
    pub committed: bool,
    pub aborted: bool,
    pub reboots: u32,
    /// Make `finish` fail validation
    pub fail_finish: bool,
}

impl MockSlot {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSlotState::default())),
        }
    }

    pub fn pending() -> Self {
        let slot = Self::new();
        slot.state.lock().unwrap().pending_verify = true;
        slot
    }

    pub fn state(&self) -> Arc<Mutex<MockSlotState>> {
        Arc::clone(&self.state)
    }
}

impl Default for MockSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaSlot for MockSlot {
    fn pending_verify(&self) -> bool {
        self.state.lock().unwrap().pending_verify
    }

    fn mark_valid(&self) -> Result<(), OtaError> {
        let mut state = self.state.lock().unwrap();
        state.pending_verify = false;
        state.valid_marks += 1;
        info!("Running image marked valid");
        Ok(())
    }

    fn mark_invalid_and_reboot(&self) -> Result<(), OtaError> {
        let mut state = self.state.lock().unwrap();
        state.invalidated = true;
        state.reboots += 1;
        Ok(())
    }

    fn begin(&self, total_size: u64) -> Result<(), OtaError> {
        let mut state = self.state.lock().unwrap();
        if state.begun && !state.committed && !state.aborted {
            return Err(OtaError::InvalidState("slot write already open".to_string()));
        }
        state.begun = true;
        state.committed = false;
        state.aborted = false;
        state.expected_size = total_size;
        state.written.clear();
        Ok(())
    }

    fn write(&self, chunk: &[u8]) -> Result<(), OtaError> {
        let mut state = self.state.lock().unwrap();
        if !state.begun || state.aborted {
            return Err(OtaError::InvalidState("slot write not open".to_string()));
        }
        state.written.extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&self) -> Result<(), OtaError> {
        let mut state = self.state.lock().unwrap();
        if !state.begun || state.aborted {
            return Err(OtaError::InvalidState("slot write not open".to_string()));
        }
        if state.fail_finish {
            return Err(OtaError::IntegrityFail("simulated corrupt image".to_string()));
        }
        if state.expected_size > 0 && state.written.len() as u64 != state.expected_size {
            return Err(OtaError::IntegrityFail(format!(
                "incomplete image: {} of {} bytes",
                state.written.len(),
                state.expected_size
            )));
        }
        state.committed = true;
        Ok(())
    }

    fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        state.aborted = true;
        state.committed = false;
    }

    fn reboot(&self) {
        self.state.lock().unwrap().reboots += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_commit() {
        let slot = MockSlot::new();
        slot.begin(6).unwrap();
        slot.write(b"abc").unwrap();
        slot.write(b"def").unwrap();
        slot.finish().unwrap();

        let state = slot.state();
        let state = state.lock().unwrap();
        assert!(state.committed);
        assert_eq!(state.written, b"abcdef");
    }

    #[test]
    fn test_incomplete_image_fails_validation() {
        let slot = MockSlot::new();
        slot.begin(100).unwrap();
        slot.write(b"partial").unwrap();
        assert!(matches!(slot.finish(), Err(OtaError::IntegrityFail(_))));
        assert!(!slot.state().lock().unwrap().committed);
    }

    #[test]
    fn test_abort_leaves_slot_uncommitted() {
        let slot = MockSlot::new();
        slot.begin(10).unwrap();
        slot.write(b"1234").unwrap();
        slot.abort();

        assert!(!slot.state().lock().unwrap().committed);
        assert!(matches!(slot.write(b"more"), Err(OtaError::InvalidState(_))));

        // A new install can start after an abort
        slot.begin(4).unwrap();
        slot.write(b"full").unwrap();
        slot.finish().unwrap();
    }

    #[test]
    fn test_pending_verify_confirmation() {
        let slot = MockSlot::pending();
        assert!(slot.pending_verify());
        slot.mark_valid().unwrap();
        assert!(!slot.pending_verify());
        assert_eq!(slot.state().lock().unwrap().valid_marks, 1);
    }
}
