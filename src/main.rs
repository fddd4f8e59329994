/*
 *  main.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Boot sequence and supervisor
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

use env_logger::Env;
use log::{error, info, warn};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use pinframe::canvas::render;
use pinframe::canvas::model::FontSize;
use pinframe::canvas::CanvasEngine;
use pinframe::config;
use pinframe::display_service::{ConstBattery, DisplayPolicy, DisplayService, OpClass};
use pinframe::ota::{MockSlot, OtaEngine};
use pinframe::panel::{Color, MockBus, PanelDriver, RefreshMode};
use pinframe::plugins::builtin::{ClockPlugin, WeatherPlugin};
use pinframe::plugins::{EventBus, PluginRuntime, SystemHost};
use pinframe::store::{FileStore, KvStore};
use pinframe::web::{build_router, AppState};
use pinframe::wifi::creds::{CredentialStore, XorCipher};
use pinframe::wifi::dns::DnsPortal;
use pinframe::wifi::fsm::{self, WifiConfig, WifiFsm};
use pinframe::wifi::radio::MockRadio;
use pinframe::wifi::AP_IP;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const DEFAULT_MANIFEST_URL: &str =
    "https://api.github.com/repos/pinframe/pinframe/releases/latest";

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

/// Draw the boot splash: logo, tagline, version, status line.
async fn show_startup_screen(display: &DisplayService, version: &str) {
    let result = display
        .with_driver(OpClass::Draw, |driver| {
            let fb = driver.framebuffer_mut();
            fb.clear(Color::White);
            render::draw_text(fb, 200, 80, "Pin", FontSize::XLarge, Color::Black);
            render::draw_text(fb, 120, 140, "Digital Minimalism", FontSize::Medium, Color::Blue);
            render::draw_text(
                fb,
                180,
                180,
                &format!("Version {}", version),
                FontSize::Small,
                Color::Black,
            );
            render::draw_text(fb, 180, 220, "Initializing...", FontSize::Medium, Color::Blue);
        })
        .await;

    if result.is_ok() {
        if let Err(e) = display.refresh(RefreshMode::Full).await {
            warn!("Startup screen refresh failed: {}", e);
        }
    }
}

/// Replace the status line on the splash.
async fn update_startup_status(display: &DisplayService, status: &str) {
    let result = display
        .with_driver(OpClass::Draw, |driver| {
            let fb = driver.framebuffer_mut();
            fb.draw_rect(120, 220, 360, 30, Color::White, true);
            render::draw_text(fb, 180, 220, status, FontSize::Medium, Color::Blue);
        })
        .await;

    if result.is_ok() {
        if let Err(e) = display.refresh(RefreshMode::Partial).await {
            warn!("Startup status refresh failed: {}", e);
        }
    }
}

/// 10-second supervisor: low-battery warning, inactivity sleep, restart
/// requests from the web handlers.
async fn supervise(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        interval.tick().await;

        if state.restart_requested.load(Ordering::SeqCst) {
            info!("Restart requested, shutting down supervisor");
            return;
        }

        let voltage = state.display.battery_voltage();
        if voltage < 3.2 {
            warn!("Low battery: {:.2} V", voltage);
        }

        if state.settings().sleep_enabled && state.display.should_enter_sleep() {
            info!("Display inactive, entering deep sleep");
            if let Err(e) = state.display.sleep().await {
                warn!("Deep sleep failed: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load()?;

    let log_level = cfg.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let version = env!("CARGO_PKG_VERSION");
    info!("PinFrame {} (built {})", version, BUILD_DATE);

    // Persistent store
    let data_dir = cfg
        .data_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("./pinframe-data"));
    let store: Arc<dyn KvStore> = Arc::new(FileStore::open(&data_dir)?);
    info!("Key-value store at {}", data_dir.display());

    // Panel and display service. The SPI bus wiring lives with the
    // platform layer; the simulator bus stands in on hosts.
    let bus = MockBus::new();
    let driver = match PanelDriver::init(Box::new(bus)).await {
        Ok(driver) => driver,
        Err(e) => {
            error!("Panel initialization failed: {}", e);
            return Err(Box::new(e) as Box<dyn std::error::Error>);
        }
    };

    let display_cfg = cfg.display.clone().unwrap_or_default();
    let policy = DisplayPolicy {
        max_partial_refresh: display_cfg.max_partial_refresh.unwrap_or(10),
        full_refresh_interval: Duration::from_secs(
            display_cfg.full_refresh_interval_s.unwrap_or(1800),
        ),
        sleep_after_inactive: Duration::from_secs(
            display_cfg.sleep_after_inactive_s.unwrap_or(600),
        ),
    };
    let display = Arc::new(DisplayService::new(driver, policy, Box::new(ConstBattery(3.9))));
    show_startup_screen(&display, version).await;

    // Canvas engine
    update_startup_status(&display, "Initializing Canvas...").await;
    let canvas = Arc::new(CanvasEngine::new(Arc::clone(&store)));

    // Wi-Fi provisioning. The radio seam is platform wiring; the
    // simulator radio stands in on hosts.
    update_startup_status(&display, "Initializing WiFi...").await;
    let wifi_cfg = cfg.wifi.clone().unwrap_or_default();
    let portal = DnsPortal::new(wifi_cfg.dns_port.unwrap_or(53), AP_IP);
    let fsm = WifiFsm::new(
        Arc::new(MockRadio::new()),
        CredentialStore::new(Arc::clone(&store), Box::new(XorCipher)),
        Box::new(portal),
        WifiConfig {
            config_timeout: Duration::from_secs(wifi_cfg.config_timeout_s.unwrap_or(300)),
            connect_timeout: Duration::from_secs(wifi_cfg.connect_timeout_s.unwrap_or(15)),
            max_retry: wifi_cfg.max_retry.unwrap_or(3),
            force_ap_mode: wifi_cfg.force_ap_mode.unwrap_or(false),
        },
    );
    let wifi = Arc::new(StdMutex::new(fsm));
    tokio::spawn(fsm::run(Arc::clone(&wifi)));

    // Plugin runtime with built-ins
    update_startup_status(&display, "Loading Plugins...").await;
    let plugins = PluginRuntime::new(
        Arc::new(SystemHost::new(Arc::clone(&store))),
        Arc::new(EventBus::new()),
        Arc::clone(&display),
    );
    for (name, result) in [
        ("clock", plugins.register(Box::new(ClockPlugin::new()))),
        ("weather", plugins.register(Box::new(WeatherPlugin::new()))),
    ] {
        if let Err(e) = result {
            error!("Failed to register {} plugin: {}", name, e);
        }
    }
    Arc::clone(&plugins).start_supervisor();
    plugins.start_auto_plugins().await;

    // OTA engine. The bootloader slot seam is platform wiring.
    update_startup_status(&display, "Initializing OTA System...").await;
    let ota_cfg = cfg.ota.clone().unwrap_or_default();
    let manifest_url = ota_cfg
        .manifest_url
        .clone()
        .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string());
    let ota = OtaEngine::new(Arc::new(MockSlot::new()), version);
    ota.init();

    // Web handler surface
    update_startup_status(&display, "Starting Web Server...").await;
    let state = Arc::new(AppState {
        display: Arc::clone(&display),
        canvas,
        plugins,
        wifi,
        ota: Arc::clone(&ota),
        store,
        manifest_url: manifest_url.clone(),
        started_at: tokio::time::Instant::now(),
        restart_requested: AtomicBool::new(false),
    });
    let auto_check_hours = ota_cfg
        .auto_check_hours
        .unwrap_or(state.settings().ota_auto_check_hours);
    Arc::clone(&ota).set_auto_check_interval(auto_check_hours, manifest_url);

    let router = build_router(Arc::clone(&state));
    info!(
        "Route table ready ({} routes); HTTP front-end attachment is platform wiring",
        router.route_count()
    );

    update_startup_status(&display, "System Ready").await;
    info!("PinFrame initialization completed");

    tokio::select! {
        result = signal_handler() => {
            if let Err(e) = result {
                error!("Signal handler failed: {}", e);
            }
        }
        _ = supervise(Arc::clone(&state)) => {
            info!("Supervisor requested shutdown");
        }
    }

    // Park the panel before exit
    if let Err(e) = display.sleep().await {
        warn!("Could not put panel to sleep on shutdown: {}", e);
    }
    info!("PinFrame stopped");
    Ok(())
}
