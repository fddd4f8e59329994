/*
 *  display_service.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Mutual-exclusion façade over the panel driver with refresh policy
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
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::panel::{Color, PanelDriver, PanelError, RefreshMode};

/// Acquire deadlines by operation class. A full refresh can hold the panel
/// for up to 30 s, so waiting callers are bounded rather than queued
/// indefinitely.
#[derive(Debug, Clone, Copy)]
pub enum OpClass {
    /// Status reads, pixel peeks: 100 ms
    Quick,
    /// Rasterization into the framebuffer: 1 s
    Draw,
    /// Sleep/wake cycles: 5 s
    SleepWake,
    /// Full refresh: 30 s
    Refresh,
}

impl OpClass {
    fn deadline(self) -> Duration {
        match self {
            OpClass::Quick => Duration::from_millis(100),
            OpClass::Draw => Duration::from_secs(1),
            OpClass::SleepWake => Duration::from_secs(5),
            OpClass::Refresh => Duration::from_secs(30),
        }
    }
}

/// Error type for display-service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// The mutex acquire deadline expired; retry or abandon.
    Timeout,
    Panel(PanelError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Timeout => write!(f, "Display busy: acquire deadline expired"),
            ServiceError::Panel(e) => write!(f, "Panel operation failed: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<PanelError> for ServiceError {
    fn from(e: PanelError) -> Self {
        ServiceError::Panel(e)
    }
}

/// Refresh-policy knobs, configurable from the app config.
#[derive(Debug, Clone)]
pub struct DisplayPolicy {
    /// Partial refreshes allowed before the next one upgrades to full
    pub max_partial_refresh: u8,
    /// Seconds without a full refresh before the next one upgrades
    pub full_refresh_interval: Duration,
    /// Seconds without any refresh before deep sleep is suggested
    pub sleep_after_inactive: Duration,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            max_partial_refresh: 10,
            full_refresh_interval: Duration::from_secs(1800),
            sleep_after_inactive: Duration::from_secs(600),
        }
    }
}

/// Refresh statistics tracked by the façade.
#[derive(Debug, Default, Clone)]
pub struct RefreshStats {
    pub total_refreshes: u32,
    pub full_refreshes: u32,
    pub partial_refreshes: u32,
    pub partial_streak: u8,
    pub last_refresh: Option<Instant>,
    pub last_full_refresh: Option<Instant>,
}

/// Battery measurement seam. The ADC lives with the platform layer.
pub trait BatterySensor: Send + Sync {
    /// Pack voltage in volts.
    fn voltage(&self) -> f32;
}

/// Fixed-value sensor for hosts without an ADC, and for tests.
pub struct ConstBattery(pub f32);

impl BatterySensor for ConstBattery {
    fn voltage(&self) -> f32 {
        self.0
    }
}

/// LiPo voltage to percentage over the 3.0-4.2 V discharge range.
pub fn battery_percentage(voltage: f32) -> u8 {
    let pct = (voltage - 3.0) / (4.2 - 3.0) * 100.0;
    pct.clamp(0.0, 100.0) as u8
}

/// Serializes all panel access behind one mutex with per-operation
/// deadlines, and applies the partial-to-full refresh upgrade policy.
pub struct DisplayService {
    driver: Mutex<PanelDriver>,
    stats: StdMutex<RefreshStats>,
    policy: DisplayPolicy,
    battery: Box<dyn BatterySensor>,
}

impl DisplayService {
    pub fn new(driver: PanelDriver, policy: DisplayPolicy, battery: Box<dyn BatterySensor>) -> Self {
        Self {
            driver: Mutex::new(driver),
            stats: StdMutex::new(RefreshStats::default()),
            policy,
            battery,
        }
    }

    /// Run `f` with exclusive access to the panel driver, bounded by the
    /// operation class deadline.
    pub async fn with_driver<R>(
        &self,
        class: OpClass,
        f: impl FnOnce(&mut PanelDriver) -> R,
    ) -> Result<R, ServiceError> {
        let guard = tokio::time::timeout(class.deadline(), self.driver.lock())
            .await
            .map_err(|_| {
                warn!("Display mutex acquire timed out ({:?})", class);
                ServiceError::Timeout
            })?;
        let mut guard = guard;
        Ok(f(&mut guard))
    }

    /// Clear the framebuffer to a solid color. Does not refresh.
    pub async fn clear(&self, color: Color) -> Result<(), ServiceError> {
        self.with_driver(OpClass::Draw, |d| d.clear(color)).await
    }

    /// Refresh the panel, upgrading partials to full per policy.
    pub async fn refresh(&self, requested: RefreshMode) -> Result<(), ServiceError> {
        let mode = self.effective_mode(requested);
        if mode != requested {
            info!("Upgrading {:?} refresh to {:?} per policy", requested, mode);
        }

        let guard = tokio::time::timeout(OpClass::Refresh.deadline(), self.driver.lock())
            .await
            .map_err(|_| ServiceError::Timeout)?;
        let mut guard = guard;
        guard.refresh(mode).await?;
        drop(guard);

        self.record_refresh(mode);
        Ok(())
    }

    /// Enter deep sleep.
    pub async fn sleep(&self) -> Result<(), ServiceError> {
        let guard = tokio::time::timeout(OpClass::SleepWake.deadline(), self.driver.lock())
            .await
            .map_err(|_| ServiceError::Timeout)?;
        let mut guard = guard;
        guard.sleep().await?;
        Ok(())
    }

    /// Wake from deep sleep.
    pub async fn wake(&self) -> Result<(), ServiceError> {
        let guard = tokio::time::timeout(OpClass::SleepWake.deadline(), self.driver.lock())
            .await
            .map_err(|_| ServiceError::Timeout)?;
        let mut guard = guard;
        guard.wake().await?;
        Ok(())
    }

    fn effective_mode(&self, requested: RefreshMode) -> RefreshMode {
        if requested == RefreshMode::Full {
            return requested;
        }
        let stats = self.stats.lock().unwrap();
        if stats.partial_streak >= self.policy.max_partial_refresh {
            return RefreshMode::Full;
        }
        match stats.last_full_refresh {
            Some(t) if t.elapsed() < self.policy.full_refresh_interval => requested,
            Some(_) => RefreshMode::Full,
            // Never full-refreshed: force one to establish a clean image
            None => RefreshMode::Full,
        }
    }

    fn record_refresh(&self, mode: RefreshMode) {
        let mut stats = self.stats.lock().unwrap();
        let now = Instant::now();
        stats.total_refreshes += 1;
        stats.last_refresh = Some(now);
        match mode {
            RefreshMode::Full => {
                stats.full_refreshes += 1;
                stats.last_full_refresh = Some(now);
                stats.partial_streak = 0;
            }
            RefreshMode::Partial | RefreshMode::Fast => {
                stats.partial_refreshes += 1;
                stats.partial_streak = stats.partial_streak.saturating_add(1);
            }
        }
        debug!(
            "Refresh recorded: total={} full={} partial={} streak={}",
            stats.total_refreshes, stats.full_refreshes, stats.partial_refreshes, stats.partial_streak
        );
    }

    /// True after `sleep_after_inactive` without any refresh; the supervisor
    /// uses this to initiate deep sleep.
    pub fn should_enter_sleep(&self) -> bool {
        let stats = self.stats.lock().unwrap();
        match stats.last_refresh {
            Some(t) => t.elapsed() >= self.policy.sleep_after_inactive,
            None => false,
        }
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn battery_voltage(&self) -> f32 {
        self.battery.voltage()
    }

    pub fn battery_percentage(&self) -> u8 {
        battery_percentage(self.battery.voltage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::MockBus;

    async fn service() -> DisplayService {
        let driver = PanelDriver::init(Box::new(MockBus::new())).await.unwrap();
        DisplayService::new(driver, DisplayPolicy::default(), Box::new(ConstBattery(3.9)))
    }

    #[test]
    fn test_battery_percentage_mapping() {
        assert_eq!(battery_percentage(4.2), 100);
        assert_eq!(battery_percentage(3.0), 0);
        assert_eq!(battery_percentage(2.5), 0);
        assert_eq!(battery_percentage(4.4), 100);
        assert_eq!(battery_percentage(3.6), 50);
    }

    #[tokio::test]
    async fn test_first_refresh_upgrades_to_full() {
        let svc = service().await;
        svc.refresh(RefreshMode::Partial).await.unwrap();

        let stats = svc.stats();
        assert_eq!(stats.full_refreshes, 1);
        assert_eq!(stats.partial_refreshes, 0);
    }

    #[tokio::test]
    async fn test_partial_streak_forces_full() {
        let svc = service().await;
        svc.refresh(RefreshMode::Full).await.unwrap();

        for _ in 0..10 {
            svc.refresh(RefreshMode::Partial).await.unwrap();
        }
        assert_eq!(svc.stats().partial_streak, 10);

        // The eleventh partial is upgraded
        svc.refresh(RefreshMode::Partial).await.unwrap();
        let stats = svc.stats();
        assert_eq!(stats.partial_streak, 0);
        assert_eq!(stats.full_refreshes, 2);
    }

    #[tokio::test]
    async fn test_should_enter_sleep() {
        tokio::time::pause();
        let svc = service().await;
        assert!(!svc.should_enter_sleep());

        svc.refresh(RefreshMode::Full).await.unwrap();
        assert!(!svc.should_enter_sleep());

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(svc.should_enter_sleep());
    }

    #[tokio::test]
    async fn test_mutex_is_exclusive() {
        let svc = std::sync::Arc::new(service().await);

        // Hold the driver across an await point; a Quick op must time out.
        let guard = svc.driver.lock().await;
        let other = svc.clone();
        let waited = tokio::spawn(async move {
            other.with_driver(OpClass::Quick, |_| ()).await
        });
        let result = waited.await.unwrap();
        assert!(matches!(result, Err(ServiceError::Timeout)));
        drop(guard);

        // Released: the same op succeeds
        assert!(svc.with_driver(OpClass::Quick, |_| ()).await.is_ok());
    }
}
