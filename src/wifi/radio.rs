/*
 *  wifi/radio.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Radio abstraction between the provisioning FSM and the Wi-Fi hardware
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

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Error type for radio operations.
#[derive(Debug)]
pub enum RadioError {
    HardwareFail(String),
    InvalidArgument(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::HardwareFail(msg) => write!(f, "Radio hardware error: {}", msg),
            RadioError::InvalidArgument(msg) => write!(f, "Invalid radio argument: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

/// Station link state as observed between FSM ticks. External link events
/// are coalesced into this snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    /// Got-IP received
    Connected,
    /// Disconnected/auth-fail received
    Failed,
}

/// Authentication modes reported by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    Wpa3Psk,
}

/// One scan result row.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub ssid: String,
    pub rssi: i8,
    pub auth: AuthMode,
    pub channel: u8,
}

/// Hardware seam for the provisioning FSM and the portal handlers.
///
/// `connect` only initiates association; completion is observed through
/// `link_state` on subsequent ticks.
pub trait WifiRadio: Send + Sync {
    fn start_ap(&self, ssid: &str) -> Result<(), RadioError>;
    fn stop_ap(&self) -> Result<(), RadioError>;
    fn scan(&self) -> Result<Vec<NetworkInfo>, RadioError>;
    fn connect(&self, ssid: &str, password: &str) -> Result<(), RadioError>;
    fn disconnect(&self) -> Result<(), RadioError>;
    fn link_state(&self) -> LinkState;
    fn rssi(&self) -> Option<i8>;
    fn mac(&self) -> [u8; 6];
}

/// Scripted radio double for FSM tests.
pub struct MockRadio {
    state: Arc<Mutex<MockRadioState>>,
}

#[derive(Debug)]
pub struct MockRadioState {
    /// Scan results returned to callers
    pub scan_results: Vec<NetworkInfo>,

    /// Whether the next connect attempt eventually succeeds
    pub accept_connect: bool,

    /// link_state polls spent in Connecting before resolving
    pub connect_latency_polls: u32,

    /// Remaining polls of the in-flight attempt
    polls_remaining: u32,

    link: LinkState,

    /// SSIDs of every started AP
    pub ap_started: Vec<String>,
    pub ap_active: bool,

    /// (ssid, password) of every connect attempt
    pub connect_attempts: Vec<(String, String)>,

    /// Simulate a link drop after connecting
    pub drop_link: bool,
}

impl Default for MockRadioState {
    fn default() -> Self {
        Self {
            scan_results: Vec::new(),
            accept_connect: true,
            connect_latency_polls: 1,
            polls_remaining: 0,
            link: LinkState::Idle,
            ap_started: Vec::new(),
            ap_active: false,
            connect_attempts: Vec::new(),
            drop_link: false,
        }
    }
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockRadioState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockRadioState>> {
        Arc::clone(&self.state)
    }

    pub fn with_networks(networks: Vec<NetworkInfo>) -> Self {
        let radio = Self::new();
        radio.state.lock().unwrap().scan_results = networks;
        radio
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiRadio for MockRadio {
    fn start_ap(&self, ssid: &str) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        state.ap_started.push(ssid.to_string());
        state.ap_active = true;
        Ok(())
    }

    fn stop_ap(&self) -> Result<(), RadioError> {
        self.state.lock().unwrap().ap_active = false;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<NetworkInfo>, RadioError> {
        Ok(self.state.lock().unwrap().scan_results.clone())
    }

    fn connect(&self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts.push((ssid.to_string(), password.to_string()));
        state.polls_remaining = state.connect_latency_polls;
        state.link = LinkState::Connecting;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), RadioError> {
        self.state.lock().unwrap().link = LinkState::Idle;
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        let mut state = self.state.lock().unwrap();
        if state.link == LinkState::Connecting {
            if state.polls_remaining > 0 {
                state.polls_remaining -= 1;
            } else {
                state.link = if state.accept_connect {
                    LinkState::Connected
                } else {
                    LinkState::Failed
                };
            }
        } else if state.link == LinkState::Connected && state.drop_link {
            state.drop_link = false;
            state.link = LinkState::Failed;
        }
        state.link
    }

    fn rssi(&self) -> Option<i8> {
        let state = self.state.lock().unwrap();
        if state.link == LinkState::Connected {
            Some(-55)
        } else {
            None
        }
    }

    fn mac(&self) -> [u8; 6] {
        [0x24, 0x6F, 0x28, 0x11, 0x3C, 0x7F]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_connect_resolves_after_latency() {
        let radio = MockRadio::new();
        radio.state().lock().unwrap().connect_latency_polls = 2;

        radio.connect("HomeNet", "secret").unwrap();
        assert_eq!(radio.link_state(), LinkState::Connecting);
        assert_eq!(radio.link_state(), LinkState::Connecting);
        assert_eq!(radio.link_state(), LinkState::Connected);
        assert_eq!(radio.rssi(), Some(-55));
    }

    #[test]
    fn test_mock_connect_rejection() {
        let radio = MockRadio::new();
        {
            let state = radio.state();
            let mut state = state.lock().unwrap();
            state.accept_connect = false;
            state.connect_latency_polls = 0;
        }

        radio.connect("HomeNet", "wrong").unwrap();
        assert_eq!(radio.link_state(), LinkState::Connecting);
        assert_eq!(radio.link_state(), LinkState::Failed);
        assert_eq!(radio.rssi(), None);
    }

    #[test]
    fn test_mock_records_ap_lifecycle() {
        let radio = MockRadio::new();
        radio.start_ap("Pin-Device-3C7F").unwrap();
        assert!(radio.state().lock().unwrap().ap_active);
        radio.stop_ap().unwrap();
        assert!(!radio.state().lock().unwrap().ap_active);
        assert_eq!(radio.state().lock().unwrap().ap_started, vec!["Pin-Device-3C7F"]);
    }
}
