/*
 *  wifi/fsm.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Eight-state provisioning and connection state machine
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
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::wifi::ap_ssid_for_mac;
use crate::wifi::creds::{CredentialStore, Credentials};
use crate::wifi::radio::{LinkState, WifiRadio};

/// Delay before retrying a failed connect.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Dwell on the timeout screen before reopening the portal.
const TIMEOUT_DWELL: Duration = Duration::from_secs(3);

/// Provisioning states. Transitions are evaluated once per 1 Hz tick and
/// are monotonic within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Idle,
    CheckSaved,
    ApMode,
    PortalActive,
    Connecting,
    Connected,
    Failed,
    Timeout,
}

/// Provisioning timeouts and retry budget.
#[derive(Debug, Clone)]
pub struct WifiConfig {
    /// How long the portal waits for credentials
    pub config_timeout: Duration,
    /// How long one connect attempt may take
    pub connect_timeout: Duration,
    pub max_retry: u8,
    /// Skip saved credentials and open the portal straight away
    pub force_ap_mode: bool,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            config_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(15),
            max_retry: 3,
            force_ap_mode: false,
        }
    }
}

/// Captive-portal lifecycle hook. The production hook spawns/aborts the
/// DNS catch-all task; tests use [`NullPortal`].
pub trait PortalControl: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// No-op portal hook.
pub struct NullPortal;

impl PortalControl for NullPortal {
    fn start(&self) {}
    fn stop(&self) {}
}

/// Status snapshot for the web API.
#[derive(Debug, Clone, Serialize)]
pub struct WifiStatus {
    pub state: WifiState,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap_ssid: Option<String>,
}

/// The provisioning state machine.
///
/// Credentials reach the FSM only through [`WifiFsm::submit_credentials`]
/// (the portal handler hands them over via the flag, it never writes the
/// store); the FSM persists them after the first successful association.
pub struct WifiFsm {
    state: WifiState,
    config: WifiConfig,
    radio: Arc<dyn WifiRadio>,
    creds: CredentialStore,
    portal: Box<dyn PortalControl>,
    ap_ssid: Option<String>,
    target: Option<Credentials>,
    portal_start: Option<Instant>,
    connect_start: Option<Instant>,
    wait_until: Option<Instant>,
    retry_count: u8,
    config_received: bool,
    connect_initiated: bool,
    persisted: bool,
}

impl WifiFsm {
    pub fn new(
        radio: Arc<dyn WifiRadio>,
        creds: CredentialStore,
        portal: Box<dyn PortalControl>,
        config: WifiConfig,
    ) -> Self {
        Self {
            state: WifiState::Idle,
            config,
            radio,
            creds,
            portal,
            ap_ssid: None,
            target: None,
            portal_start: None,
            connect_start: None,
            wait_until: None,
            retry_count: 0,
            config_received: false,
            connect_initiated: false,
            persisted: false,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    pub fn current_ssid(&self) -> Option<String> {
        if self.is_connected() {
            self.target.as_ref().map(|c| c.ssid.clone())
        } else {
            None
        }
    }

    pub fn ap_ssid(&self) -> Option<String> {
        self.ap_ssid.clone()
    }

    pub fn radio(&self) -> Arc<dyn WifiRadio> {
        Arc::clone(&self.radio)
    }

    pub fn has_saved_credentials(&self) -> bool {
        self.creds.has_saved()
    }

    pub fn clear_credentials(&self) {
        if let Err(e) = self.creds.clear() {
            warn!("Failed to clear Wi-Fi credentials: {}", e);
        }
    }

    pub fn status(&self) -> WifiStatus {
        WifiStatus {
            state: self.state,
            connected: self.is_connected(),
            ssid: self.current_ssid(),
            rssi: self.radio.rssi(),
            ap_ssid: self.ap_ssid.clone(),
        }
    }

    /// Hand over credentials from the portal. Sets `config_received`; the
    /// FSM picks them up on its next tick.
    pub fn submit_credentials(&mut self, ssid: &str, password: &str) -> Result<(), String> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err("SSID must be 1..=32 bytes".to_string());
        }
        if password.len() > 64 {
            return Err("password must be at most 64 bytes".to_string());
        }
        self.target = Some(Credentials {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
        self.config_received = true;
        info!("Received portal credentials for '{}'", ssid);
        Ok(())
    }

    /// One 1 Hz evaluation of the machine.
    pub fn tick(&mut self) {
        if let Some(until) = self.wait_until {
            if Instant::now() < until {
                return;
            }
            self.wait_until = None;
        }

        match self.state {
            WifiState::Idle => {
                info!("Wi-Fi provisioning started");
                self.enter(WifiState::CheckSaved);
            }

            WifiState::CheckSaved => {
                if !self.config.force_ap_mode {
                    match self.creds.load() {
                        Ok(Some(creds)) => {
                            info!("Found saved credentials for '{}'", creds.ssid);
                            self.target = Some(creds);
                            self.begin_connecting();
                            return;
                        }
                        Ok(None) => debug!("No saved Wi-Fi credentials"),
                        Err(e) => warn!("Could not read saved credentials: {}", e),
                    }
                }
                self.enter(WifiState::ApMode);
            }

            WifiState::ApMode => {
                let ssid = ap_ssid_for_mac(self.radio.mac());
                if let Err(e) = self.radio.start_ap(&ssid) {
                    // Stay in ApMode; the next tick retries
                    error!("Failed to start provisioning AP: {}", e);
                    return;
                }
                info!("Provisioning AP '{}' up, portal starting", ssid);
                self.ap_ssid = Some(ssid);
                self.portal.start();
                self.portal_start = Some(Instant::now());
                self.enter(WifiState::PortalActive);
            }

            WifiState::PortalActive => {
                if self.config_received {
                    self.config_received = false;
                    self.portal.stop();
                    self.begin_connecting();
                    return;
                }
                if let Some(start) = self.portal_start {
                    if start.elapsed() > self.config_timeout() {
                        warn!("Provisioning portal timed out");
                        self.enter(WifiState::Timeout);
                    }
                }
            }

            WifiState::Connecting => {
                if !self.connect_initiated {
                    let Some(target) = self.target.clone() else {
                        warn!("Connecting with no target credentials");
                        self.enter(WifiState::Failed);
                        return;
                    };
                    if let Err(e) = self.radio.connect(&target.ssid, &target.password) {
                        error!("Connect to '{}' failed to start: {}", target.ssid, e);
                        self.enter(WifiState::Failed);
                        return;
                    }
                    self.connect_initiated = true;
                    self.connect_start = Some(Instant::now());
                    return;
                }

                match self.radio.link_state() {
                    LinkState::Connected => {
                        self.connect_initiated = false;
                        self.persisted = false;
                        self.enter(WifiState::Connected);
                    }
                    LinkState::Failed => {
                        self.connect_initiated = false;
                        self.enter(WifiState::Failed);
                    }
                    _ => {
                        if let Some(start) = self.connect_start {
                            if start.elapsed() > self.config.connect_timeout {
                                warn!("Connect attempt timed out");
                                let _ = self.radio.disconnect();
                                self.connect_initiated = false;
                                self.enter(WifiState::Failed);
                            }
                        }
                    }
                }
            }

            WifiState::Connected => {
                if !self.persisted {
                    if let Some(target) = &self.target {
                        info!("Connected to '{}'", target.ssid);
                        if let Err(e) = self.creds.save(target) {
                            warn!("Failed to persist credentials: {}", e);
                        }
                    }
                    self.persisted = true;
                    self.retry_count = 0;
                }

                if self.radio.link_state() != LinkState::Connected {
                    warn!("Wi-Fi link lost, reconnecting");
                    self.begin_connecting();
                }
            }

            WifiState::Failed => {
                if self.retry_count < self.config.max_retry {
                    self.retry_count += 1;
                    info!(
                        "Connect retry {}/{} in {} s",
                        self.retry_count,
                        self.config.max_retry,
                        RETRY_DELAY.as_secs()
                    );
                    self.wait_until = Some(Instant::now() + RETRY_DELAY);
                    self.begin_connecting();
                } else {
                    warn!("Connect retries exhausted, reopening portal");
                    self.retry_count = 0;
                    self.enter(WifiState::ApMode);
                }
            }

            WifiState::Timeout => {
                self.portal.stop();
                self.wait_until = Some(Instant::now() + TIMEOUT_DWELL);
                self.enter(WifiState::ApMode);
            }
        }
    }

    fn config_timeout(&self) -> Duration {
        self.config.config_timeout
    }

    fn begin_connecting(&mut self) {
        self.connect_initiated = false;
        self.connect_start = None;
        self.enter(WifiState::Connecting);
    }

    fn enter(&mut self, state: WifiState) {
        debug!("Wi-Fi FSM {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

/// 1 Hz FSM worker. Ticks until the task is aborted.
pub async fn run(fsm: Arc<Mutex<WifiFsm>>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        fsm.lock().unwrap().tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::wifi::creds::{CredentialStore, XorCipher};
    use crate::wifi::radio::MockRadio;

    fn fsm_with(radio: MockRadio, config: WifiConfig) -> WifiFsm {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()), Box::new(XorCipher));
        WifiFsm::new(Arc::new(radio), creds, Box::new(NullPortal), config)
    }

    #[tokio::test]
    async fn test_provisioning_happy_path() {
        let radio = MockRadio::new();
        let radio_state = radio.state();
        let mut fsm = fsm_with(radio, WifiConfig::default());

        fsm.tick(); // Idle -> CheckSaved
        assert_eq!(fsm.state(), WifiState::CheckSaved);
        fsm.tick(); // no saved creds -> ApMode
        assert_eq!(fsm.state(), WifiState::ApMode);
        fsm.tick(); // AP up -> PortalActive
        assert_eq!(fsm.state(), WifiState::PortalActive);

        let ap_ssid = fsm.ap_ssid().unwrap();
        assert_eq!(ap_ssid, "Pin-Device-3C7F");
        assert!(radio_state.lock().unwrap().ap_active);

        // Portal hands credentials over
        fsm.submit_credentials("HomeNet", "hunter2").unwrap();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Connecting);

        fsm.tick(); // initiates radio connect
        fsm.tick(); // latency poll
        fsm.tick(); // link up
        assert_eq!(fsm.state(), WifiState::Connected);

        fsm.tick(); // persists credentials
        assert!(fsm.has_saved_credentials());
        assert!(fsm.is_connected());
        assert_eq!(fsm.current_ssid().unwrap(), "HomeNet");
        assert_eq!(
            radio_state.lock().unwrap().connect_attempts,
            vec![("HomeNet".to_string(), "hunter2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_saved_credentials_skip_portal() {
        let radio = MockRadio::new();
        let kv = Arc::new(MemoryStore::new());
        let creds = CredentialStore::new(kv.clone(), Box::new(XorCipher));
        creds
            .save(&Credentials {
                ssid: "HomeNet".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();
        let mut fsm = WifiFsm::new(
            Arc::new(radio),
            creds,
            Box::new(NullPortal),
            WifiConfig::default(),
        );

        fsm.tick(); // Idle -> CheckSaved
        fsm.tick(); // saved creds -> Connecting
        assert_eq!(fsm.state(), WifiState::Connecting);
    }

    #[tokio::test]
    async fn test_force_ap_mode_ignores_saved() {
        let radio = MockRadio::new();
        let kv = Arc::new(MemoryStore::new());
        let creds = CredentialStore::new(kv.clone(), Box::new(XorCipher));
        creds
            .save(&Credentials {
                ssid: "HomeNet".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();
        let mut fsm = WifiFsm::new(
            Arc::new(radio),
            creds,
            Box::new(NullPortal),
            WifiConfig {
                force_ap_mode: true,
                ..WifiConfig::default()
            },
        );

        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::ApMode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_retries_then_reopens_portal() {
        let radio = MockRadio::new();
        {
            let state = radio.state();
            let mut state = state.lock().unwrap();
            state.accept_connect = false;
            state.connect_latency_polls = 0;
        }
        let mut fsm = fsm_with(
            radio,
            WifiConfig {
                max_retry: 2,
                ..WifiConfig::default()
            },
        );

        fsm.submit_credentials("HomeNet", "wrong").unwrap();
        fsm.target = Some(Credentials {
            ssid: "HomeNet".to_string(),
            password: "wrong".to_string(),
        });
        fsm.begin_connecting();

        // Attempt 1: initiate, then observe failure
        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Failed);

        // Retry 1 scheduled after the 5 s delay
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Connecting);
        fsm.tick(); // still waiting out the delay
        assert_eq!(fsm.retry_count, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        fsm.tick(); // initiate retry
        fsm.tick(); // fail again
        assert_eq!(fsm.state(), WifiState::Failed);

        fsm.tick(); // retry 2
        tokio::time::advance(Duration::from_secs(6)).await;
        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Failed);

        // Budget exhausted: back to the portal
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::ApMode);
        assert_eq!(fsm.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_portal_timeout_cycles_back_to_ap() {
        let radio = MockRadio::new();
        let mut fsm = fsm_with(
            radio,
            WifiConfig {
                config_timeout: Duration::from_secs(30),
                ..WifiConfig::default()
            },
        );

        fsm.tick();
        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::PortalActive);

        tokio::time::advance(Duration::from_secs(31)).await;
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Timeout);

        fsm.tick(); // dwell + reopen
        assert_eq!(fsm.state(), WifiState::ApMode);

        // Dwell holds the machine for 3 s
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::ApMode);
        tokio::time::advance(Duration::from_secs(4)).await;
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::PortalActive);
    }

    #[tokio::test]
    async fn test_link_loss_reconnects() {
        let radio = MockRadio::new();
        let radio_state = radio.state();
        let mut fsm = fsm_with(radio, WifiConfig::default());

        fsm.submit_credentials("HomeNet", "hunter2").unwrap();
        fsm.begin_connecting();
        fsm.tick(); // initiate
        fsm.tick(); // latency
        fsm.tick(); // connected
        assert_eq!(fsm.state(), WifiState::Connected);
        fsm.tick(); // persist

        radio_state.lock().unwrap().drop_link = true;
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Connecting);
    }

    #[test]
    fn test_submit_credentials_validation() {
        let radio = MockRadio::new();
        let mut fsm = fsm_with(radio, WifiConfig::default());

        assert!(fsm.submit_credentials("", "pw").is_err());
        assert!(fsm.submit_credentials(&"s".repeat(33), "pw").is_err());
        assert!(fsm.submit_credentials("net", &"p".repeat(65)).is_err());
        assert!(fsm.submit_credentials("net", "").is_ok()); // open networks
    }
}
