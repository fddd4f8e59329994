/*
 *  panel/bus.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Bus abstraction between the panel driver and the SPI/GPIO hardware
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

use crate::panel::error::PanelError;

/// Hardware seam between the panel driver and the SPI bus / control pins.
///
/// The real implementation lives with the platform layer; the driver only
/// needs command/data writes, the reset line, and the BUSY input. All
/// methods are synchronous single transfers; pacing (busy-wait sleeps) is
/// the driver's job.
pub trait PanelBus: Send {
    /// Write a single command byte (DC low).
    fn write_command(&mut self, cmd: u8) -> Result<(), PanelError>;

    /// Write a data payload (DC high).
    fn write_data(&mut self, data: &[u8]) -> Result<(), PanelError>;

    /// Pulse the RST line: low for at least 10 ms, then high.
    fn hardware_reset(&mut self) -> Result<(), PanelError>;

    /// Sample the BUSY input. High means the controller is working.
    fn is_busy(&self) -> bool;
}

/// Bus double for testing the driver without hardware.
///
/// Records every command and the total data volume, and can be scripted to
/// hold BUSY for a number of polls or to fail transfers outright. State is
/// shared so tests keep a handle after moving the bus into the driver.
#[derive(Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

#[derive(Debug, Default)]
pub struct MockBusState {
    /// Every command byte written, in order
    pub commands: Vec<u8>,

    /// Data bytes following the most recent command
    pub last_data: Vec<u8>,

    /// Total data bytes written over the bus lifetime
    pub data_bytes_written: usize,

    /// Number of hardware resets performed
    pub reset_count: usize,

    /// Remaining polls for which BUSY reads high
    pub busy_polls_remaining: u32,

    /// BUSY polls to schedule after the next command that starts work
    pub busy_polls_per_op: u32,

    /// Fail the next write with BusFail
    pub fail_next_write: bool,

    /// Hold BUSY forever (timeout testing)
    pub stuck_busy: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockBusState::default())),
        }
    }

    /// Shared state handle for inspection in tests.
    pub fn state(&self) -> Arc<Mutex<MockBusState>> {
        Arc::clone(&self.state)
    }

    /// Script BUSY to stay high for `polls` samples after each command that
    /// kicks off controller work (power on, refresh, power off).
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.lock().unwrap().busy_polls_per_op = polls;
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelBus for MockBus {
    fn write_command(&mut self, cmd: u8) -> Result<(), PanelError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(PanelError::BusFail("simulated command failure".to_string()));
        }
        state.commands.push(cmd);
        state.last_data.clear();

        // These commands make the controller raise BUSY until done.
        use crate::panel::commands::{DISPLAY_REFRESH, POWER_OFF, POWER_ON};
        if matches!(cmd, POWER_ON | POWER_OFF | DISPLAY_REFRESH) {
            state.busy_polls_remaining = state.busy_polls_per_op;
        }
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), PanelError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(PanelError::BusFail("simulated data failure".to_string()));
        }
        state.last_data.extend_from_slice(data);
        state.data_bytes_written += data.len();
        Ok(())
    }

    fn hardware_reset(&mut self) -> Result<(), PanelError> {
        let mut state = self.state.lock().unwrap();
        state.reset_count += 1;
        state.busy_polls_remaining = state.busy_polls_per_op;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.stuck_busy {
            return true;
        }
        if state.busy_polls_remaining > 0 {
            state.busy_polls_remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::commands;

    #[test]
    fn test_mock_bus_records_commands() {
        let mut bus = MockBus::new();
        bus.write_command(commands::PANEL_SETTING).unwrap();
        bus.write_data(&[0x1F]).unwrap();

        let state = bus.state();
        let state = state.lock().unwrap();
        assert_eq!(state.commands, vec![commands::PANEL_SETTING]);
        assert_eq!(state.last_data, vec![0x1F]);
        assert_eq!(state.data_bytes_written, 1);
    }

    #[test]
    fn test_mock_bus_busy_script() {
        let mut bus = MockBus::new();
        bus.set_busy_polls(2);
        bus.write_command(commands::POWER_ON).unwrap();

        assert!(bus.is_busy());
        assert!(bus.is_busy());
        assert!(!bus.is_busy());
    }

    #[test]
    fn test_mock_bus_failure_injection() {
        let mut bus = MockBus::new();
        bus.state().lock().unwrap().fail_next_write = true;

        assert!(bus.write_command(commands::POWER_ON).is_err());
        // One-shot: the next write succeeds
        assert!(bus.write_command(commands::POWER_ON).is_ok());
    }
}
