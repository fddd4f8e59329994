/*
 *  ota/engine.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Update engine - manifest polling and the streaming install worker
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Notify;

use crate::ota::manifest::{parse_manifest, UpdateInfo};
use crate::ota::slot::OtaSlot;
use crate::ota::OtaError;

/// Manifest fetch deadline.
const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between the completion callback and the reboot, so the
/// web UI can show the result.
const REBOOT_DELAY: Duration = Duration::from_secs(3);

/// Update engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaState {
    Idle,
    Checking,
    Downloading,
    Installing,
    Complete,
    Error,
}

/// Status snapshot for the web API.
#[derive(Debug, Clone, Serialize)]
pub struct OtaStatus {
    pub state: OtaState,
    pub progress_percent: u8,
    pub current_version: String,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_update: Option<UpdateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<u64>,
    pub error_message: String,
}

/// Progress callback: (percent, downloaded bytes, total bytes).
pub type ProgressCallback = Box<dyn Fn(u8, u64, u64) + Send + Sync>;

/// Completion callback: (success, message).
pub type CompleteCallback = Box<dyn Fn(bool, &str) + Send + Sync>;

/// The OTA engine. One install worker at a time; all errors are
/// recoverable because the alternate slot stays un-committed until the
/// final validate step.
pub struct OtaEngine {
    status: StdMutex<OtaStatus>,
    slot: Arc<dyn OtaSlot>,
    client: Client,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
    in_progress: AtomicBool,
    auto_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OtaEngine {
    pub fn new(slot: Arc<dyn OtaSlot>, current_version: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            status: StdMutex::new(OtaStatus {
                state: OtaState::Idle,
                progress_percent: 0,
                current_version: current_version.into(),
                update_available: false,
                available_update: None,
                last_check_time: None,
                error_message: String::new(),
            }),
            slot,
            client: Client::new(),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            in_progress: AtomicBool::new(false),
            auto_task: StdMutex::new(None),
        })
    }

    /// Boot-time hook: a pending-verify image reaching this point has
    /// booted successfully, so confirm it.
    pub fn init(&self) {
        if self.slot.pending_verify() {
            warn!("Running image pending verification, confirming");
            if let Err(e) = self.slot.mark_valid() {
                error!("Failed to confirm running image: {}", e);
            }
        }
    }

    pub fn status(&self) -> OtaStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn current_version(&self) -> String {
        self.status.lock().unwrap().current_version.clone()
    }

    /// Fetch the release manifest and compare versions.
    ///
    /// Comparison is exact string inequality against the running version;
    /// tag names are opaque (nightly builds, datestamps), so no semver
    /// ordering is attempted.
    pub async fn check_update(&self, url: &str) -> Result<bool, OtaError> {
        if self.in_progress.load(Ordering::SeqCst) {
            return Err(OtaError::InvalidState("install in progress".to_string()));
        }

        info!("Checking for updates at {}", url);
        self.status.lock().unwrap().state = OtaState::Checking;

        let result = self.fetch_manifest(url).await;

        let mut status = self.status.lock().unwrap();
        status.last_check_time = Some(unix_now());

        match result {
            Ok(info) => {
                let available = info.version != status.current_version;
                if available {
                    info!("Update available: {} -> {}", status.current_version, info.version);
                } else {
                    info!("Already running latest version {}", status.current_version);
                }
                status.update_available = available;
                status.available_update = Some(info);
                status.state = OtaState::Idle;
                Ok(available)
            }
            Err(e) => {
                status.state = OtaState::Error;
                status.error_message = format!("Update check failed: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch_manifest(&self, url: &str) -> Result<UpdateInfo, OtaError> {
        let response = self
            .client
            .get(url)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| OtaError::Manifest(e.to_string()))?
            .error_for_status()
            .map_err(|e| OtaError::Manifest(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| OtaError::Manifest(e.to_string()))?;
        parse_manifest(&text)
    }

    /// Spawn the install worker. Rejected unless an update is known and
    /// no install is running.
    pub fn start_update(
        self: Arc<Self>,
        progress_cb: ProgressCallback,
        complete_cb: CompleteCallback,
    ) -> Result<(), OtaError> {
        let update = {
            let status = self.status.lock().unwrap();
            if !status.update_available {
                return Err(OtaError::InvalidState("no update available".to_string()));
            }
            status.available_update.clone().ok_or_else(|| {
                OtaError::InvalidState("no update metadata".to_string())
            })?
        };

        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Err(OtaError::InvalidState("install already in progress".to_string()));
        }
        self.cancel_requested.store(false, Ordering::SeqCst);

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            engine.run_install(update, progress_cb, complete_cb).await;
        });

        info!("OTA install started");
        Ok(())
    }

    async fn run_install(
        self: Arc<Self>,
        update: UpdateInfo,
        progress_cb: ProgressCallback,
        complete_cb: CompleteCallback,
    ) {
        info!("Installing {} from {}", update.version, update.url);

        match self.download_and_commit(&update, &progress_cb).await {
            Ok(()) => {
                {
                    let mut status = self.status.lock().unwrap();
                    status.state = OtaState::Complete;
                    status.progress_percent = 100;
                }
                info!("OTA install complete, rebooting shortly");
                complete_cb(true, "Update installed successfully - rebooting");
                tokio::time::sleep(REBOOT_DELAY).await;
                self.in_progress.store(false, Ordering::SeqCst);
                self.slot.reboot();
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut status = self.status.lock().unwrap();
                    status.state = OtaState::Error;
                    status.error_message = message.clone();
                }
                error!("OTA install failed: {}", message);
                self.in_progress.store(false, Ordering::SeqCst);
                complete_cb(false, &message);
            }
        }
    }

    async fn download_and_commit(
        &self,
        update: &UpdateInfo,
        progress_cb: &ProgressCallback,
    ) -> Result<(), OtaError> {
        {
            let mut status = self.status.lock().unwrap();
            status.state = OtaState::Downloading;
            status.progress_percent = 0;
        }

        let mut response = self
            .client
            .get(&update.url)
            .send()
            .await
            .map_err(|e| OtaError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| OtaError::Http(e.to_string()))?;

        let total = response.content_length().unwrap_or(update.size);
        self.slot.begin(total)?;

        let mut downloaded: u64 = 0;
        loop {
            if self.cancel_requested.load(Ordering::SeqCst) {
                self.slot.abort();
                return Err(OtaError::Cancelled);
            }

            let chunk = tokio::select! {
                chunk = response.chunk() => chunk.map_err(|e| {
                    self.slot.abort();
                    OtaError::Http(e.to_string())
                })?,
                _ = self.cancel_notify.notified() => {
                    self.slot.abort();
                    return Err(OtaError::Cancelled);
                }
            };

            let Some(chunk) = chunk else { break };
            self.slot.write(&chunk)?;
            downloaded += chunk.len() as u64;

            let percent = if total > 0 {
                ((downloaded * 100) / total).min(100) as u8
            } else {
                0
            };
            self.status.lock().unwrap().progress_percent = percent;
            progress_cb(percent, downloaded, total);

            tokio::task::yield_now().await;
        }

        self.status.lock().unwrap().state = OtaState::Installing;
        self.slot.finish()?;
        Ok(())
    }

    /// Request cancellation; the worker honors it between chunks.
    pub fn cancel_update(&self) -> Result<(), OtaError> {
        let state = self.status.lock().unwrap().state;
        if !matches!(state, OtaState::Downloading | OtaState::Installing) {
            return Err(OtaError::InvalidState("no install to cancel".to_string()));
        }
        info!("OTA cancellation requested");
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
        Ok(())
    }

    /// Invalidate the running image; the bootloader falls back to the
    /// previous slot on the reboot this triggers.
    pub fn rollback(&self) -> Result<(), OtaError> {
        warn!("Rolling back to previous firmware");
        self.slot.mark_invalid_and_reboot()
    }

    /// Confirm the running image.
    pub fn mark_valid(&self) -> Result<(), OtaError> {
        self.slot.mark_valid()
    }

    /// Enable or disable periodic update checks. Zero hours disables.
    pub fn set_auto_check_interval(self: Arc<Self>, hours: u32, manifest_url: String) {
        let mut task = self.auto_task.lock().unwrap();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        if hours == 0 {
            info!("OTA auto-check disabled");
            return;
        }

        info!("OTA auto-check every {} hour(s)", hours);
        let engine = Arc::clone(&self);
        *task = Some(tokio::spawn(async move {
            let period = Duration::from_secs(hours as u64 * 3600);
            loop {
                tokio::time::sleep(period).await;
                if let Err(e) = engine.check_update(&manifest_url).await {
                    warn!("Periodic update check failed: {}", e);
                }
            }
        }));
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
