/*
 *  plugins/runtime.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Plugin registry, lifecycle state machine and per-plugin workers
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
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::canvas::render;
use crate::display_service::{DisplayService, OpClass};
use crate::panel::{Color, RefreshMode};
use crate::plugins::api::{
    HostApi, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata, PluginState,
    ScheduleState, WidgetRegion, DEFAULT_API_RATE_LIMIT, DEFAULT_MEMORY_LIMIT,
    DEFAULT_UPDATE_INTERVAL, MAX_ERRORS, MAX_MEMORY_LIMIT, MAX_PLUGINS, SUSPEND_COOLDOWN,
};
use crate::plugins::events::EventBus;

/// Depth of the supervisor's control queue.
const SUPERVISOR_QUEUE_DEPTH: usize = 10;

/// Widget rows start below the status area and stack downward.
const WIDGET_TOP: u16 = 40;
const WIDGET_ROW_HEIGHT: u16 = 96;
const WIDGET_MARGIN: u16 = 10;

/// Control messages consumed by the supervisor worker.
#[derive(Debug)]
pub enum PluginMessage {
    Enable { name: String, enable: bool },
    ConfigChanged { name: String, key: String, value: String },
    Shutdown,
}

/// Summary row for the web API.
#[derive(Debug, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub state: PluginState,
    pub enabled: bool,
    pub auto_start: bool,
    pub memory_used: usize,
    pub memory_peak: usize,
    pub update_count: u32,
    pub error_count: u32,
    pub api_calls: u32,
}

struct SlotInner {
    plugin: Box<dyn Plugin>,
    ctx: PluginContext,
    error_count: u32,
    initialized: bool,
}

/// One registered plugin: descriptor, context and worker control.
pub struct PluginSlot {
    pub id: u8,
    pub name: String,
    metadata: PluginMetadata,
    config: PluginConfig,
    inner: Mutex<SlotInner>,
    state: StdMutex<PluginState>,
    enabled: AtomicBool,
    kill: Notify,
}

impl PluginSlot {
    pub fn state(&self) -> PluginState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: PluginState) {
        *self.state.lock().unwrap() = state;
        debug!("Plugin '{}' -> {:?}", self.name, state);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// What the worker does after one iteration.
enum Step {
    Sleep {
        interval_s: u64,
        schedule: Arc<ScheduleState>,
        repaint: Option<WidgetRegion>,
    },
    Cooldown,
    Exit,
}

/// The plugin runtime: fixed-size registry, one supervisor worker and one
/// worker per enabled plugin.
pub struct PluginRuntime {
    slots: StdMutex<Vec<Arc<PluginSlot>>>,
    tx: mpsc::Sender<PluginMessage>,
    rx: StdMutex<Option<mpsc::Receiver<PluginMessage>>>,
    host: Arc<dyn HostApi>,
    events: Arc<EventBus>,
    display: Arc<DisplayService>,
}

impl PluginRuntime {
    pub fn new(host: Arc<dyn HostApi>, events: Arc<EventBus>, display: Arc<DisplayService>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(SUPERVISOR_QUEUE_DEPTH);
        Arc::new(Self {
            slots: StdMutex::new(Vec::new()),
            tx,
            rx: StdMutex::new(Some(rx)),
            host,
            events,
            display,
        })
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Validate and register a plugin. The plugin lands in `Loaded` and is
    /// not scheduled until enabled.
    pub fn register(&self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let metadata = plugin.metadata();
        if metadata.name.is_empty() || metadata.name.len() > 31 {
            return Err(PluginError::InvalidArgument(
                "plugin name must be 1..=31 bytes".to_string(),
            ));
        }
        if metadata.version.is_empty() {
            return Err(PluginError::InvalidArgument("plugin version is required".to_string()));
        }

        let config = clamp_config(&metadata.name, plugin.default_config());

        let mut slots = self.slots.lock().unwrap();
        if slots.len() >= MAX_PLUGINS {
            return Err(PluginError::LimitReached);
        }
        if slots.iter().any(|s| s.name == metadata.name) {
            return Err(PluginError::AlreadyExists);
        }

        let id = slots.len() as u8;
        let region = WidgetRegion::new(
            WIDGET_MARGIN,
            WIDGET_TOP + id as u16 * WIDGET_ROW_HEIGHT,
            crate::panel::PANEL_WIDTH - 2 * WIDGET_MARGIN,
            WIDGET_ROW_HEIGHT - 6,
        );
        let ctx = PluginContext::new(
            metadata.name.clone(),
            config.clone(),
            region,
            Arc::clone(&self.host),
            Arc::clone(&self.events),
        );

        let slot = Arc::new(PluginSlot {
            id,
            name: metadata.name.clone(),
            metadata,
            config,
            inner: Mutex::new(SlotInner {
                plugin,
                ctx,
                error_count: 0,
                initialized: false,
            }),
            state: StdMutex::new(PluginState::Loaded),
            enabled: AtomicBool::new(false),
            kill: Notify::new(),
        });

        info!("Plugin '{}' registered with id {}", slot.name, id);
        slots.push(slot);
        Ok(())
    }

    fn find(&self, name: &str) -> Result<Arc<PluginSlot>, PluginError> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or(PluginError::NotFound)
    }

    /// Enable or disable a plugin by name.
    ///
    /// Enabling walks Loaded -> Initialized -> Running and spawns the
    /// worker; a plugin parked in Error is given a fresh error budget.
    /// Disabling signals the worker, waits out the in-flight update, and
    /// calls `stop`.
    pub async fn enable(&self, name: &str, enable: bool) -> Result<(), PluginError> {
        let slot = self.find(name)?;

        if enable {
            if slot.is_enabled() {
                return Ok(());
            }
            info!("Enabling plugin '{}'", name);

            {
                let mut inner = slot.inner.lock().await;

                if slot.state() == PluginState::Error {
                    inner.error_count = 0;
                }

                if !inner.initialized {
                    let SlotInner { plugin, ctx, .. } = &mut *inner;
                    if let Err(e) = plugin.init(ctx) {
                        error!("Plugin '{}' init failed: {}", name, e);
                        slot.set_state(PluginState::Error);
                        return Err(e);
                    }
                    inner.initialized = true;
                    slot.set_state(PluginState::Initialized);
                }

                let SlotInner { plugin, ctx, .. } = &mut *inner;
                if let Err(e) = plugin.start(ctx) {
                    error!("Plugin '{}' start failed: {}", name, e);
                    slot.set_state(PluginState::Error);
                    return Err(e);
                }
            }

            slot.enabled.store(true, Ordering::SeqCst);
            slot.set_state(PluginState::Running);

            let worker_slot = Arc::clone(&slot);
            let display = Arc::clone(&self.display);
            tokio::spawn(async move {
                run_worker(worker_slot, display).await;
            });
            info!("Plugin '{}' enabled", name);
        } else {
            if !slot.is_enabled() && slot.state() != PluginState::Error {
                return Ok(());
            }
            info!("Disabling plugin '{}'", name);

            slot.enabled.store(false, Ordering::SeqCst);
            slot.kill.notify_one();

            // Waits for any in-flight update to finish
            let mut inner = slot.inner.lock().await;
            let SlotInner { plugin, ctx, .. } = &mut *inner;
            if let Err(e) = plugin.stop(ctx) {
                warn!("Plugin '{}' stop returned error: {}", name, e);
            }
            slot.set_state(PluginState::Loaded);
            info!("Plugin '{}' disabled", name);
        }

        Ok(())
    }

    /// Tear a plugin all the way down to Unloaded and drop it from the
    /// registry.
    pub async fn cleanup(&self, name: &str) -> Result<(), PluginError> {
        let slot = self.find(name)?;

        if slot.is_enabled() {
            self.enable(name, false).await?;
        }

        {
            let mut inner = slot.inner.lock().await;
            let SlotInner { plugin, ctx, .. } = &mut *inner;
            if let Err(e) = plugin.cleanup(ctx) {
                warn!("Plugin '{}' cleanup returned error: {}", name, e);
            }
        }
        slot.set_state(PluginState::Unloaded);

        let mut slots = self.slots.lock().unwrap();
        slots.retain(|s| s.name != name);
        info!("Plugin '{}' unloaded", name);
        Ok(())
    }

    /// Persist a plugin config value and deliver `config_changed`.
    pub async fn set_config(&self, name: &str, key: &str, value: &str) -> Result<(), PluginError> {
        let slot = self.find(name)?;

        let scoped = format!("plugin_{}_{}", name, key);
        self.host.config_set(&scoped, value)?;

        let mut inner = slot.inner.lock().await;
        let SlotInner { plugin, ctx, .. } = &mut *inner;
        plugin.config_changed(ctx, key, value)
    }

    pub fn get_config(&self, name: &str, key: &str) -> Result<String, PluginError> {
        self.find(name)?;
        let scoped = format!("plugin_{}_{}", name, key);
        self.host.config_get(&scoped)
    }

    /// Snapshot of every registered plugin for the web API.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let slots: Vec<Arc<PluginSlot>> = self.slots.lock().unwrap().clone();
        let mut rows = Vec::with_capacity(slots.len());
        for slot in slots {
            let inner = slot.inner.lock().await;
            rows.push(PluginSummary {
                name: slot.metadata.name.clone(),
                version: slot.metadata.version.clone(),
                author: slot.metadata.author.clone(),
                description: slot.metadata.description.clone(),
                state: slot.state(),
                enabled: slot.is_enabled(),
                auto_start: slot.config.auto_start,
                memory_used: inner.ctx.stats.memory_used,
                memory_peak: inner.ctx.stats.memory_peak,
                update_count: inner.ctx.stats.update_count,
                error_count: inner.ctx.stats.error_count,
                api_calls: inner.ctx.stats.api_calls_count,
            });
        }
        rows
    }

    pub fn state_of(&self, name: &str) -> Result<PluginState, PluginError> {
        Ok(self.find(name)?.state())
    }

    /// Enable every plugin registered with `auto_start`.
    pub async fn start_auto_plugins(&self) {
        let names: Vec<String> = {
            let slots = self.slots.lock().unwrap();
            slots
                .iter()
                .filter(|s| s.config.auto_start)
                .map(|s| s.name.clone())
                .collect()
        };
        for name in names {
            if let Err(e) = self.enable(&name, true).await {
                warn!("Auto-start of plugin '{}' failed: {}", name, e);
            }
        }
    }

    /// Queue a control message for the supervisor. Fails with
    /// `InvalidState` when the bounded queue is full.
    pub fn send(&self, message: PluginMessage) -> Result<(), PluginError> {
        self.tx
            .try_send(message)
            .map_err(|_| PluginError::InvalidState("supervisor queue full".to_string()))
    }

    /// Spawn the supervisor worker. Call once at boot.
    pub fn start_supervisor(self: Arc<Self>) {
        let rx = self.rx.lock().unwrap().take();
        let Some(mut rx) = rx else {
            warn!("Plugin supervisor already started");
            return;
        };

        let runtime = self;
        tokio::spawn(async move {
            info!("Plugin supervisor started");
            while let Some(message) = rx.recv().await {
                match message {
                    PluginMessage::Enable { name, enable } => {
                        if let Err(e) = runtime.enable(&name, enable).await {
                            warn!("Supervisor enable({}, {}) failed: {}", name, enable, e);
                        }
                    }
                    PluginMessage::ConfigChanged { name, key, value } => {
                        if let Err(e) = runtime.set_config(&name, &key, &value).await {
                            warn!("Supervisor config change for '{}' failed: {}", name, e);
                        }
                    }
                    PluginMessage::Shutdown => break,
                }
            }
            info!("Plugin supervisor stopped");
        });
    }
}

fn clamp_config(name: &str, mut config: PluginConfig) -> PluginConfig {
    if config.memory_limit == 0 {
        config.memory_limit = DEFAULT_MEMORY_LIMIT;
    }
    if config.memory_limit > MAX_MEMORY_LIMIT {
        warn!(
            "Plugin '{}' memory limit {} clamped to {}",
            name, config.memory_limit, MAX_MEMORY_LIMIT
        );
        config.memory_limit = MAX_MEMORY_LIMIT;
    }
    if config.update_interval == 0 {
        config.update_interval = DEFAULT_UPDATE_INTERVAL;
    }
    if config.update_interval < 10 {
        warn!(
            "Plugin '{}' update interval {} s is shorter than recommended",
            name, config.update_interval
        );
    }
    if config.api_rate_limit == 0 {
        config.api_rate_limit = DEFAULT_API_RATE_LIMIT;
    }
    config
}

fn check_resources(ctx: &PluginContext) -> Result<(), &'static str> {
    if ctx.stats.memory_used > ctx.config().memory_limit {
        return Err("memory limit exceeded");
    }
    if ctx.is_suspended {
        return Err("api rate limit exceeded");
    }
    Ok(())
}

async fn run_worker(slot: Arc<PluginSlot>, display: Arc<DisplayService>) {
    info!("Plugin '{}' worker started", slot.name);

    loop {
        if !slot.is_enabled() {
            break;
        }

        match worker_step(&slot).await {
            Step::Exit => break,
            Step::Cooldown => {
                tokio::select! {
                    _ = tokio::time::sleep(SUSPEND_COOLDOWN) => {}
                    _ = slot.kill.notified() => {}
                }
            }
            Step::Sleep { interval_s, schedule, repaint } => {
                if let Some(region) = repaint {
                    paint_widget(&slot.name, &display, &region).await;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval_s)) => {}
                    _ = schedule.notify.notified() => {
                        debug!("Plugin '{}' woken by scheduled update", slot.name);
                    }
                    _ = slot.kill.notified() => {}
                }
            }
        }
    }

    info!("Plugin '{}' worker stopped", slot.name);
}

async fn worker_step(slot: &Arc<PluginSlot>) -> Step {
    let mut inner = slot.inner.lock().await;

    if let Err(reason) = check_resources(&inner.ctx) {
        warn!("Plugin '{}' suspended: {}", slot.name, reason);
        slot.set_state(PluginState::Suspended);
        // The cooldown serves the sentence; quotas are re-evaluated after
        inner.ctx.is_suspended = false;
        return Step::Cooldown;
    }

    if slot.state() == PluginState::Suspended {
        slot.set_state(PluginState::Running);
    }

    let interval_s = inner.ctx.config().update_interval.max(1) as u64;
    let schedule = Arc::clone(&inner.ctx.schedule);

    let SlotInner {
        plugin,
        ctx,
        error_count,
        ..
    } = &mut *inner;

    match plugin.update(ctx).await {
        Ok(()) => {
            *error_count = 0;
            ctx.stats.update_count += 1;
        }
        Err(e) => {
            *error_count += 1;
            ctx.stats.error_count += 1;
            warn!(
                "Plugin '{}' update failed ({}/{}): {}",
                slot.name, error_count, MAX_ERRORS, e
            );
            if *error_count >= MAX_ERRORS {
                error!(
                    "Plugin '{}' disabled after {} consecutive errors",
                    slot.name, MAX_ERRORS
                );
                slot.enabled.store(false, Ordering::SeqCst);
                slot.set_state(PluginState::Error);
                return Step::Exit;
            }
        }
    }

    // Give the plugin a chance to draw into its region before the repaint
    let mut region = inner.ctx.region.clone();
    {
        let SlotInner { plugin, ctx, .. } = &mut *inner;
        if let Err(e) = plugin.render(ctx, &mut region) {
            warn!("Plugin '{}' render failed: {}", slot.name, e);
        } else {
            ctx.region = region;
        }
    }

    let repaint = if inner.ctx.region.dirty && inner.ctx.region.visible {
        inner.ctx.region.dirty = false;
        Some(inner.ctx.region.clone())
    } else {
        None
    };

    Step::Sleep {
        interval_s,
        schedule,
        repaint,
    }
}

/// Repaint a plugin's widget region and request a partial refresh. Panel
/// access goes through the display-service mutex like any other caller.
async fn paint_widget(name: &str, display: &DisplayService, region: &WidgetRegion) {
    let result = display
        .with_driver(OpClass::Draw, |driver| {
            let fb = driver.framebuffer_mut();
            fb.draw_rect(
                region.x as i32,
                region.y as i32,
                region.width,
                region.height,
                Color::White,
                true,
            );
            render::draw_text(
                fb,
                region.x as i32 + 4,
                region.y as i32 + 4,
                &region.content,
                region.font_size,
                region.color,
            );
        })
        .await;

    match result {
        Ok(()) => {
            if let Err(e) = display.refresh(RefreshMode::Partial).await {
                warn!("Plugin '{}' widget refresh failed: {}", name, e);
            }
        }
        Err(e) => warn!("Plugin '{}' widget draw failed: {}", name, e),
    }
}
