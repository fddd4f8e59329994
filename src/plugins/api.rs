/*
 *  plugins/api.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  The plugin-facing API surface - trait, context, quotas
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

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;

use crate::canvas::model::FontSize;
use crate::panel::Color;
use crate::plugins::events::EventBus;

/// Boxed future used for async trait methods (host HTTP, plugin update).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Registry capacity.
pub const MAX_PLUGINS: usize = 8;

/// Consecutive update failures before a plugin is parked in Error.
pub const MAX_ERRORS: u32 = 5;

/// Default per-plugin memory budget.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024;

/// Hard ceiling for the configurable memory budget.
pub const MAX_MEMORY_LIMIT: usize = 256 * 1024;

/// Default update cadence in seconds.
pub const DEFAULT_UPDATE_INTERVAL: u32 = 60;

/// Default host-API budget per rate window.
pub const DEFAULT_API_RATE_LIMIT: u32 = 100;

/// Length of the API rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// How long a suspended plugin sits out before its quotas are re-checked.
pub const SUSPEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Error type shared by the runtime and the host API.
#[derive(Debug)]
pub enum PluginError {
    InvalidArgument(String),
    NotFound,
    AlreadyExists,
    /// Registry is full
    LimitReached,
    /// Allocation denied by the memory quota
    OutOfMemory,
    /// Host-API budget for the current window is spent
    RateLimited,
    /// HTTP target is not on the domain allow-list
    NotAllowed,
    Http(String),
    Storage(String),
    InvalidState(String),
    /// Plugin-reported failure; counts against the error budget
    Failed(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            PluginError::NotFound => write!(f, "Plugin not found"),
            PluginError::AlreadyExists => write!(f, "Plugin name already registered"),
            PluginError::LimitReached => write!(f, "Plugin registry is full"),
            PluginError::OutOfMemory => write!(f, "Plugin memory limit exceeded"),
            PluginError::RateLimited => write!(f, "Plugin API rate limit exceeded"),
            PluginError::NotAllowed => write!(f, "Domain not on the allow-list"),
            PluginError::Http(msg) => write!(f, "Plugin HTTP call failed: {}", msg),
            PluginError::Storage(msg) => write!(f, "Plugin config storage failed: {}", msg),
            PluginError::InvalidState(msg) => write!(f, "Invalid plugin state: {}", msg),
            PluginError::Failed(msg) => write!(f, "Plugin failure: {}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

/// Plugin lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loaded,
    Initialized,
    Running,
    Suspended,
    Error,
}

/// Static descriptor supplied by the plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub homepage: String,
    pub min_firmware_version: u32,
}

/// Per-plugin resource and scheduling configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PluginConfig {
    /// Bytes the plugin may hold through the tracking allocator
    pub memory_limit: usize,
    /// Seconds between update calls (minimum 1 enforced by the worker)
    pub update_interval: u32,
    /// Host-API calls allowed per 60-second window
    pub api_rate_limit: u32,
    /// Enable at boot
    pub auto_start: bool,
    /// Keep running across display sleep
    pub persistent: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            api_rate_limit: DEFAULT_API_RATE_LIMIT,
            auto_start: false,
            persistent: false,
        }
    }
}

/// Runtime statistics, readable through the web API.
#[derive(Debug, Clone)]
pub struct PluginStats {
    pub memory_used: usize,
    pub memory_peak: usize,
    pub api_calls_count: u32,
    /// Start of the current rate window; None until the first call
    pub api_calls_window_start: Option<Instant>,
    pub update_count: u32,
    pub error_count: u32,
}

impl Default for PluginStats {
    fn default() -> Self {
        Self {
            memory_used: 0,
            memory_peak: 0,
            api_calls_count: 0,
            api_calls_window_start: None,
            update_count: 0,
            error_count: 0,
        }
    }
}

/// The rectangular display region assigned to a plugin.
#[derive(Debug, Clone)]
pub struct WidgetRegion {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub color: Color,
    pub font_size: FontSize,
    pub content: String,
    pub visible: bool,
    pub dirty: bool,
}

impl WidgetRegion {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
            color: Color::Black,
            font_size: FontSize::Medium,
            content: String::new(),
            visible: true,
            dirty: false,
        }
    }
}

/// Out-of-band tick request state shared between the context and the
/// worker's sleep.
pub struct ScheduleState {
    pub notify: Notify,
    generation: AtomicU64,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            generation: AtomicU64::new(0),
        }
    }
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::new()
    }
}

/// I/O seam injected into every plugin context.
///
/// Production uses [`crate::plugins::SystemHost`]; tests substitute a
/// recording double. Rate limiting and memory accounting happen in the
/// context wrappers, not here, so a substitute host cannot bypass them.
pub trait HostApi: Send + Sync {
    fn log(&self, level: log::Level, tag: &str, message: &str);

    /// GET an allow-listed URL. 5-second timeout.
    fn http_get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, PluginError>>;

    /// POST a JSON body to an allow-listed URL. 10-second timeout.
    fn http_post<'a>(
        &'a self,
        url: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<String, PluginError>>;

    /// Read a (pre-namespaced) config key.
    fn config_get(&self, key: &str) -> Result<String, PluginError>;

    /// Write a (pre-namespaced) config key. Persisted.
    fn config_set(&self, key: &str, value: &str) -> Result<(), PluginError>;

    /// Delete a (pre-namespaced) config key.
    fn config_delete(&self, key: &str) -> Result<(), PluginError>;

    /// Milliseconds of wall clock since the Unix epoch.
    fn timestamp_ms(&self) -> u64;

    /// Local time formatted with a strftime-style pattern.
    fn format_time(&self, fmt: &str) -> String;
}

/// Everything a plugin may touch of the system.
///
/// The context owns the plugin's widget region, statistics and allocation
/// ledger; I/O goes through the injected [`HostApi`]. Every public method
/// is a host-API entry and counts against the rate budget.
pub struct PluginContext {
    plugin_name: String,
    config: PluginConfig,
    pub region: WidgetRegion,
    pub stats: PluginStats,
    pub is_suspended: bool,
    host: Arc<dyn HostApi>,
    events: Arc<EventBus>,
    pub schedule: Arc<ScheduleState>,
    allocations: HashMap<u64, usize>,
    next_allocation_id: u64,
}

impl PluginContext {
    pub fn new(
        plugin_name: impl Into<String>,
        config: PluginConfig,
        region: WidgetRegion,
        host: Arc<dyn HostApi>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            config,
            region,
            stats: PluginStats::default(),
            is_suspended: false,
            host,
            events,
            schedule: Arc::new(ScheduleState::new()),
            allocations: HashMap::new(),
            next_allocation_id: 1,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn set_plugin_config(&mut self, config: PluginConfig) {
        self.config = config;
    }

    /// Rate-window bookkeeping, run on every host-API entry.
    ///
    /// The window starts on first use and restarts whenever 60 s have
    /// elapsed, resetting the counter. A denied call still counts the
    /// attempt so a hot loop cannot probe for free calls.
    fn charge_api_call(&mut self) -> Result<(), PluginError> {
        let now = Instant::now();
        match self.stats.api_calls_window_start {
            Some(start) if now.duration_since(start) < RATE_WINDOW => {}
            _ => {
                self.stats.api_calls_window_start = Some(now);
                self.stats.api_calls_count = 0;
            }
        }

        self.stats.api_calls_count += 1;
        if self.stats.api_calls_count > self.config.api_rate_limit {
            self.is_suspended = true;
            return Err(PluginError::RateLimited);
        }
        Ok(())
    }

    /// Allocate tracked memory from the plugin's budget.
    ///
    /// Returns an opaque handle, or `OutOfMemory` with `memory_used`
    /// unchanged when the budget would be exceeded.
    pub fn alloc(&mut self, size: usize) -> Result<u64, PluginError> {
        if size == 0 {
            return Err(PluginError::InvalidArgument("zero-size allocation".to_string()));
        }
        if self.stats.memory_used + size > self.config.memory_limit {
            return Err(PluginError::OutOfMemory);
        }
        let id = self.next_allocation_id;
        self.next_allocation_id += 1;
        self.allocations.insert(id, size);
        self.stats.memory_used += size;
        self.stats.memory_peak = self.stats.memory_peak.max(self.stats.memory_used);
        Ok(id)
    }

    /// Release a tracked allocation.
    pub fn free(&mut self, handle: u64) -> Result<(), PluginError> {
        match self.allocations.remove(&handle) {
            Some(size) => {
                self.stats.memory_used = self.stats.memory_used.saturating_sub(size);
                Ok(())
            }
            None => Err(PluginError::InvalidArgument("unknown allocation handle".to_string())),
        }
    }

    // --- host-API surface ---------------------------------------------

    pub fn log(&mut self, level: log::Level, message: &str) -> Result<(), PluginError> {
        self.charge_api_call()?;
        let tag = format!("plugin:{}", self.plugin_name);
        self.host.log(level, &tag, message);
        Ok(())
    }

    pub async fn http_get(&mut self, url: &str) -> Result<String, PluginError> {
        self.charge_api_call()?;
        self.host.http_get(url).await
    }

    pub async fn http_post(&mut self, url: &str, body: &str) -> Result<String, PluginError> {
        self.charge_api_call()?;
        self.host.http_post(url, body).await
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("plugin_{}_{}", self.plugin_name, key)
    }

    pub fn config_get(&mut self, key: &str) -> Result<String, PluginError> {
        self.charge_api_call()?;
        let scoped = self.scoped_key(key);
        self.host.config_get(&scoped)
    }

    pub fn config_set(&mut self, key: &str, value: &str) -> Result<(), PluginError> {
        self.charge_api_call()?;
        let scoped = self.scoped_key(key);
        self.host.config_set(&scoped, value)
    }

    pub fn config_delete(&mut self, key: &str) -> Result<(), PluginError> {
        self.charge_api_call()?;
        let scoped = self.scoped_key(key);
        self.host.config_delete(&scoped)
    }

    pub fn timestamp_ms(&mut self) -> Result<u64, PluginError> {
        self.charge_api_call()?;
        Ok(self.host.timestamp_ms())
    }

    pub fn format_time(&mut self, fmt: &str) -> Result<String, PluginError> {
        self.charge_api_call()?;
        Ok(self.host.format_time(fmt))
    }

    /// Replace the widget content; marks the region dirty so the worker
    /// repaints it after the update call returns.
    pub fn update_content(&mut self, text: &str) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.region.content = text.to_string();
        self.region.dirty = true;
        Ok(())
    }

    pub fn set_color(&mut self, color: Color) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.region.color = color;
        self.region.dirty = true;
        Ok(())
    }

    pub fn set_font_size(&mut self, font_size: FontSize) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.region.font_size = font_size;
        self.region.dirty = true;
        Ok(())
    }

    /// Request an out-of-band update tick after `delay_s` seconds.
    pub fn schedule_update(&mut self, delay_s: u32) -> Result<(), PluginError> {
        self.charge_api_call()?;
        let schedule = Arc::clone(&self.schedule);
        let generation = schedule.generation.load(Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_s as u64)).await;
            if schedule.generation.load(Ordering::SeqCst) == generation {
                schedule.notify.notify_one();
            }
        });
        Ok(())
    }

    /// Invalidate any pending scheduled tick.
    pub fn cancel_scheduled_update(&mut self) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.schedule.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Publish an event on the in-process bus.
    pub fn emit(&mut self, name: &str, payload: &str) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.events.emit(name, payload);
        Ok(())
    }

    /// Subscribe to an event by name.
    pub fn subscribe(
        &mut self,
        name: &str,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), PluginError> {
        self.charge_api_call()?;
        self.events.subscribe(name, callback);
        Ok(())
    }
}

/// A display plugin.
///
/// `init` is the only mandatory callback; the rest default to no-ops.
/// `update` runs on the plugin's own worker at its configured cadence and
/// may await host HTTP calls.
pub trait Plugin: Send {
    fn metadata(&self) -> PluginMetadata;

    /// Configuration defaults; the runtime clamps them on registration.
    fn default_config(&self) -> PluginConfig {
        PluginConfig::default()
    }

    fn init(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    fn start(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn update<'a>(&'a mut self, _ctx: &'a mut PluginContext) -> BoxFuture<'a, Result<(), PluginError>> {
        Box::pin(async { Ok(()) })
    }

    fn render(&mut self, _ctx: &mut PluginContext, _region: &mut WidgetRegion) -> Result<(), PluginError> {
        Ok(())
    }

    fn config_changed(
        &mut self,
        _ctx: &mut PluginContext,
        _key: &str,
        _value: &str,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn stop(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }
}
