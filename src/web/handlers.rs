use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;

use crate::canvas::engine::{CanvasEngine, CanvasError};
use crate::canvas::json as canvas_json;
use crate::canvas::model::ImageFormat;
use crate::canvas::MAX_IMAGE_SIZE;
use crate::display_service::{DisplayService, ServiceError};
use crate::ota::OtaEngine;
use crate::panel::{Color, RefreshMode};
use crate::plugins::PluginRuntime;
use crate::store::{KvStore, StoreError, NS_CANVAS, NS_IMAGES, NS_OTA, NS_PLUGINS};
use crate::web::types::{Method, Request, Response, Router};
use crate::wifi::fsm::{WifiFsm, WifiState};
use crate::wifi::portal;

/// Persisted device settings, kept as one JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub device_name: String,
    pub ota_auto_check_hours: u32,
    pub sleep_enabled: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_name: "Pin E-ink Display".to_string(),
            ota_auto_check_hours: 24,
            sleep_enabled: true,
        }
    }
}

const SETTINGS_KEY: &str = "settings";

/// Everything the handlers need, shared behind one Arc.
pub struct AppState {
    pub display: Arc<DisplayService>,
    pub canvas: Arc<CanvasEngine>,
    pub plugins: Arc<PluginRuntime>,
    pub wifi: Arc<StdMutex<WifiFsm>>,
    pub ota: Arc<OtaEngine>,
    pub store: Arc<dyn KvStore>,
    pub manifest_url: String,
    pub started_at: Instant,
    /// Set by the restart/factory-reset handlers; the supervisor performs
    /// the actual restart.
    pub restart_requested: AtomicBool,
}

impl AppState {
    pub fn settings(&self) -> DeviceSettings {
        match self.store.get_blob(NS_OTA, SETTINGS_KEY) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => DeviceSettings::default(),
        }
    }

    pub fn save_settings(&self, settings: &DeviceSettings) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(settings).unwrap_or_else(|_| b"{}".to_vec());
        self.store.set_blob(NS_OTA, SETTINGS_KEY, &bytes)?;
        self.store.commit(NS_OTA)
    }
}

/// Best-effort free-memory reading from /proc; zero when unavailable.
fn free_heap_bytes() -> u64 {
    let Ok(content) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kib: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return kib * 1024;
        }
    }
    0
}

fn canvas_error_response(e: CanvasError) -> Response {
    match e {
        CanvasError::InvalidArgument(msg) => Response::error(400, &msg),
        CanvasError::NotFound => Response::error(404, "Canvas not found"),
        CanvasError::AlreadyExists => Response::error(400, "Canvas already exists"),
        CanvasError::Full => Response::error(400, "Canvas element limit reached"),
        CanvasError::Duplicate => Response::error(400, "Element id already exists"),
        CanvasError::TooLarge => Response::error(413, "Image too large"),
        CanvasError::Storage(e) => Response::error(500, &e.to_string()),
        CanvasError::Display(ServiceError::Timeout) => Response::error(503, "Display busy"),
        CanvasError::Display(e) => Response::error(500, &e.to_string()),
    }
}

fn service_error_response(e: ServiceError) -> Response {
    match e {
        ServiceError::Timeout => Response::error(503, "Display busy"),
        ServiceError::Panel(e) => Response::error(500, &e.to_string()),
    }
}

// --- device ------------------------------------------------------------

async fn status(state: Arc<AppState>) -> Response {
    let settings = state.settings();
    let wifi_status = state.wifi.lock().unwrap().status();

    let mut wifi = json!({ "connected": wifi_status.connected });
    if let Some(ssid) = wifi_status.ssid {
        wifi["ssid"] = json!(ssid);
    }
    if let Some(rssi) = wifi_status.rssi {
        wifi["rssi"] = json!(rssi);
    }

    Response::ok_json(&json!({
        "firmware_version": state.ota.current_version(),
        "device_name": settings.device_name,
        "battery_voltage": state.display.battery_voltage(),
        "battery_percentage": state.display.battery_percentage(),
        "wifi": wifi,
        "system": {
            "free_heap": free_heap_bytes(),
            "uptime": state.started_at.elapsed().as_secs(),
        },
    }))
}

async fn display_refresh(state: Arc<AppState>) -> Response {
    match state.display.refresh(RefreshMode::Full).await {
        Ok(()) => Response::ok_json(&json!({ "message": "Display refreshed" })),
        Err(e) => service_error_response(e),
    }
}

async fn display_clear(state: Arc<AppState>) -> Response {
    match state.display.clear(Color::White).await {
        Ok(()) => Response::ok_json(&json!({ "message": "Display cleared" })),
        Err(e) => service_error_response(e),
    }
}

// --- canvas ------------------------------------------------------------

async fn canvas_list(state: Arc<AppState>) -> Response {
    match state.canvas.summaries().await {
        Ok(rows) => Response::ok_json(&json!({ "total": rows.len(), "canvases": rows })),
        Err(e) => canvas_error_response(e),
    }
}

#[derive(Deserialize)]
struct CanvasCreateBody {
    id: String,
    name: String,
}

async fn canvas_create(state: Arc<AppState>, request: Request) -> Response {
    let body: CanvasCreateBody = match request.json() {
        Ok(body) => body,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };
    match state.canvas.create(&body.id, &body.name).await {
        Ok(()) => Response::json(201, &json!({ "message": "Canvas created", "id": body.id })),
        Err(e) => canvas_error_response(e),
    }
}

async fn canvas_get(state: Arc<AppState>, request: Request) -> Response {
    let Some(id) = request.query_param("id") else {
        return Response::error(400, "Missing id parameter");
    };
    match state.canvas.export_json(id).await {
        Ok(body) => Response {
            status: 200,
            content_type: "application/json",
            body: body.into_bytes(),
            headers: Vec::new(),
        },
        Err(e) => canvas_error_response(e),
    }
}

async fn canvas_update(state: Arc<AppState>, request: Request) -> Response {
    let Ok(body) = String::from_utf8(request.body) else {
        return Response::error(400, "Body is not UTF-8");
    };
    match state.canvas.import_json(&body).await {
        Ok(id) => Response::ok_json(&json!({ "message": "Canvas updated", "id": id })),
        Err(e) => canvas_error_response(e),
    }
}

async fn canvas_delete(state: Arc<AppState>, request: Request) -> Response {
    let Some(id) = request.query_param("id") else {
        return Response::error(400, "Missing id parameter");
    };
    match state.canvas.delete(id).await {
        Ok(()) => Response::ok_json(&json!({ "message": "Canvas deleted" })),
        Err(e) => canvas_error_response(e),
    }
}

#[derive(Deserialize)]
struct CanvasDisplayBody {
    canvas_id: String,
}

async fn canvas_display(state: Arc<AppState>, request: Request) -> Response {
    let body: CanvasDisplayBody = match request.json() {
        Ok(body) => body,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };
    match state.canvas.display(&body.canvas_id, &state.display).await {
        Ok(()) => Response::ok_json(&json!({ "message": "Canvas displayed" })),
        Err(e) => canvas_error_response(e),
    }
}

#[derive(Deserialize)]
struct ElementAddBody {
    canvas_id: String,
    element: serde_json::Value,
}

async fn canvas_element_add(state: Arc<AppState>, request: Request) -> Response {
    let body: ElementAddBody = match request.json() {
        Ok(body) => body,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };
    let element = match canvas_json::parse_element(body.element) {
        Ok(element) => element,
        Err(e) => return Response::error(400, &e.to_string()),
    };
    match state.canvas.add_element(&body.canvas_id, element).await {
        Ok(()) => Response::json(201, &json!({ "message": "Element added" })),
        Err(e) => canvas_error_response(e),
    }
}

async fn image_upload(state: Arc<AppState>, request: Request) -> Response {
    let Some(id) = request.query_param("id").map(str::to_string) else {
        return Response::error(400, "Missing id parameter");
    };
    if request.body.is_empty() {
        return Response::error(400, "Empty image body");
    }
    if request.body.len() > MAX_IMAGE_SIZE {
        return Response::error(413, "Image too large");
    }

    let format = ImageFormat::detect(&request.body);
    match state.canvas.store_image(&id, &request.body, format).await {
        Ok(()) => Response::json(
            201,
            &json!({
                "message": "Image uploaded",
                "image_id": id,
                "format": format,
                "size": request.body.len(),
            }),
        ),
        Err(e) => canvas_error_response(e),
    }
}

// --- plugins -----------------------------------------------------------

async fn plugins_list(state: Arc<AppState>) -> Response {
    Response::ok_json(&state.plugins.list().await)
}

#[derive(Deserialize)]
struct PluginEnableBody {
    enabled: bool,
}

async fn plugin_enable(state: Arc<AppState>, request: Request) -> Response {
    let name = request
        .path
        .trim_start_matches("/api/plugins/")
        .to_string();
    if name.is_empty() {
        return Response::error(400, "Missing plugin name");
    }
    let body: PluginEnableBody = match request.json() {
        Ok(body) => body,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };

    match state.plugins.enable(&name, body.enabled).await {
        Ok(()) => Response::ok_json(&json!({ "name": name, "enabled": body.enabled })),
        Err(crate::plugins::PluginError::NotFound) => Response::error(404, "Plugin not found"),
        Err(e) => Response::error(500, &e.to_string()),
    }
}

// --- settings and system ----------------------------------------------

async fn settings_get(state: Arc<AppState>) -> Response {
    Response::ok_json(&state.settings())
}

async fn settings_post(state: Arc<AppState>, request: Request) -> Response {
    let settings: DeviceSettings = match request.json() {
        Ok(settings) => settings,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };
    if settings.device_name.is_empty() || settings.device_name.len() > 63 {
        return Response::error(400, "device_name must be 1..=63 bytes");
    }

    if let Err(e) = state.save_settings(&settings) {
        return Response::error(500, &e.to_string());
    }
    Arc::clone(&state.ota)
        .set_auto_check_interval(settings.ota_auto_check_hours, state.manifest_url.clone());
    Response::ok_json(&json!({ "message": "Settings saved" }))
}

async fn system_restart(state: Arc<AppState>) -> Response {
    info!("Restart requested via web API");
    state.restart_requested.store(true, Ordering::SeqCst);
    Response::ok_json(&json!({ "message": "Restarting" }))
}

async fn system_factory_reset(state: Arc<AppState>) -> Response {
    warn!("Factory reset requested via web API");

    state.wifi.lock().unwrap().clear_credentials();
    for ns in [NS_CANVAS, NS_IMAGES, NS_PLUGINS, NS_OTA] {
        match state.store.keys(ns) {
            Ok(keys) => {
                for key in keys {
                    let _ = state.store.erase(ns, &key);
                }
                let _ = state.store.commit(ns);
            }
            Err(e) => warn!("Factory reset could not list {}: {}", ns, e),
        }
    }

    state.restart_requested.store(true, Ordering::SeqCst);
    Response::ok_json(&json!({ "message": "Factory reset complete, restarting" }))
}

async fn system_check_update(state: Arc<AppState>) -> Response {
    match state.ota.check_update(&state.manifest_url).await {
        Ok(_) => Response::ok_json(&state.ota.status()),
        Err(_) => Response::json(502, &state.ota.status()),
    }
}

// --- router ------------------------------------------------------------

/// Bind every route of the web surface to the given subsystems. The
/// returned table is handed to the external HTTP server.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    // Static PWA assets
    router.route(Method::Get, "/", |_req| async {
        Response::static_asset("text/html", include_str!("assets/index.html"))
    });
    router.route(Method::Get, "/app.js", |_req| async {
        Response::static_asset("application/javascript", include_str!("assets/app.js"))
    });
    router.route(Method::Get, "/manifest.json", |_req| async {
        Response::static_asset("application/json", include_str!("assets/manifest.json"))
    });
    router.route(Method::Get, "/sw.js", |_req| async {
        Response::static_asset("application/javascript", include_str!("assets/sw.js"))
    });
    router.route(Method::Get, "/config", |_req| async {
        Response::static_asset("text/html", include_str!("assets/index.html"))
    });

    // Device status and display control
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/status", move |_req| status(Arc::clone(&s)));
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/display/refresh", move |_req| {
        display_refresh(Arc::clone(&s))
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/display/clear", move |_req| {
        display_clear(Arc::clone(&s))
    });

    // Canvas API
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/canvas", move |_req| canvas_list(Arc::clone(&s)));
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/canvas", move |req| {
        canvas_create(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/canvas/get", move |req| {
        canvas_get(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Put, "/api/canvas/update", move |req| {
        canvas_update(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Delete, "/api/canvas/delete", move |req| {
        canvas_delete(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/canvas/display", move |req| {
        canvas_display(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/canvas/element", move |req| {
        canvas_element_add(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/images", move |req| {
        image_upload(Arc::clone(&s), req)
    });

    // Plugins
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/plugins", move |_req| plugins_list(Arc::clone(&s)));
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/plugins/*", move |req| {
        plugin_enable(Arc::clone(&s), req)
    });

    // Wi-Fi (also the captive portal surface)
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/wifi/scan", move |_req| {
        let wifi = Arc::clone(&s.wifi);
        async move { portal::scan_handler(&wifi) }
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/wifi/connect", move |req| {
        let wifi = Arc::clone(&s.wifi);
        async move { portal::connect_handler(&wifi, &req) }
    });

    // Settings and system
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/settings", move |_req| settings_get(Arc::clone(&s)));
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/settings", move |req| {
        settings_post(Arc::clone(&s), req)
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/system/restart", move |_req| {
        system_restart(Arc::clone(&s))
    });
    let s = Arc::clone(&state);
    router.route(Method::Post, "/api/system/factory-reset", move |_req| {
        system_factory_reset(Arc::clone(&s))
    });
    let s = Arc::clone(&state);
    router.route(Method::Get, "/api/system/check-update", move |_req| {
        system_check_update(Arc::clone(&s))
    });

    // Captive-portal catch-all: unmatched GETs redirect to the config
    // page while provisioning is active.
    let s = Arc::clone(&state);
    router.set_fallback(move |req| {
        let wifi = Arc::clone(&s.wifi);
        async move {
            let provisioning = matches!(
                wifi.lock().unwrap().state(),
                WifiState::ApMode | WifiState::PortalActive | WifiState::Timeout
            );
            if provisioning {
                portal::redirect_handler(req)
            } else {
                Response::error(404, "Not found")
            }
        }
    });

    router
}
