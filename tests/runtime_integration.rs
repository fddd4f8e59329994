/*
 *  tests/runtime_integration.rs
 *
 *  Integration tests for the plugin runtime, Wi-Fi provisioning and OTA
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pinframe::display_service::{ConstBattery, DisplayPolicy, DisplayService};
use pinframe::ota::{MockSlot, OtaEngine, OtaState};
use pinframe::panel::{MockBus, PanelDriver};
use pinframe::plugins::api::BoxFuture;
use pinframe::plugins::{
    EventBus, HostApi, Plugin, PluginConfig, PluginContext, PluginError, PluginMetadata,
    PluginRuntime, PluginState,
};
use pinframe::store::MemoryStore;
use pinframe::web::types::{Method, Request};
use pinframe::wifi::creds::{CredentialStore, XorCipher};
use pinframe::wifi::fsm::{NullPortal, WifiConfig, WifiFsm, WifiState};
use pinframe::wifi::portal;
use pinframe::wifi::radio::MockRadio;

/// Host double: config in memory, HTTP always empty JSON.
#[derive(Default)]
struct StubHost {
    config: StdMutex<HashMap<String, String>>,
}

impl HostApi for StubHost {
    fn log(&self, _level: log::Level, _tag: &str, _message: &str) {}

    fn http_get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, PluginError>> {
        Box::pin(async { Ok("{}".to_string()) })
    }

    fn http_post<'a>(
        &'a self,
        _url: &'a str,
        _body: &'a str,
    ) -> BoxFuture<'a, Result<String, PluginError>> {
        Box::pin(async { Ok("{}".to_string()) })
    }

    fn config_get(&self, key: &str) -> Result<String, PluginError> {
        self.config
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(PluginError::NotFound)
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), PluginError> {
        self.config
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn config_delete(&self, key: &str) -> Result<(), PluginError> {
        self.config.lock().unwrap().remove(key);
        Ok(())
    }

    fn timestamp_ms(&self) -> u64 {
        0
    }

    fn format_time(&self, _fmt: &str) -> String {
        "00:00".to_string()
    }
}

/// Exercises the memory quota, then burns its error budget:
/// update 1: oversized alloc is denied, reported as an error
/// update 2: in-budget alloc + free succeeds
/// updates 3..: plain failures until the runtime parks the plugin
struct QuotaPlugin {
    update_no: Arc<AtomicU32>,
    oversize_denied: Arc<AtomicU32>,
}

impl Plugin for QuotaPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "quota".to_string(),
            version: "1.0.0".to_string(),
            author: "tests".to_string(),
            description: "memory quota exerciser".to_string(),
            homepage: String::new(),
            min_firmware_version: 0,
        }
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig {
            memory_limit: 1024,
            update_interval: 1,
            ..PluginConfig::default()
        }
    }

    fn init(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn update<'a>(&'a mut self, ctx: &'a mut PluginContext) -> BoxFuture<'a, Result<(), PluginError>> {
        Box::pin(async move {
            let n = self.update_no.fetch_add(1, Ordering::SeqCst) + 1;
            match n {
                1 => {
                    let used_before = ctx.stats.memory_used;
                    match ctx.alloc(2048) {
                        Err(PluginError::OutOfMemory) => {
                            assert_eq!(ctx.stats.memory_used, used_before);
                            self.oversize_denied.fetch_add(1, Ordering::SeqCst);
                        }
                        other => panic!("expected OutOfMemory, got {:?}", other.map(|_| ())),
                    }
                    Err(PluginError::Failed("allocation denied".to_string()))
                }
                2 => {
                    let handle = ctx.alloc(512)?;
                    assert_eq!(ctx.stats.memory_used, 512);
                    ctx.free(handle)?;
                    assert_eq!(ctx.stats.memory_used, 0);
                    Ok(())
                }
                _ => Err(PluginError::Failed("scripted failure".to_string())),
            }
        })
    }
}

async fn test_runtime() -> Arc<PluginRuntime> {
    let driver = PanelDriver::init(Box::new(MockBus::new())).await.unwrap();
    let display = Arc::new(DisplayService::new(
        driver,
        DisplayPolicy::default(),
        Box::new(ConstBattery(4.0)),
    ));
    PluginRuntime::new(Arc::new(StubHost::default()), Arc::new(EventBus::new()), display)
}

#[tokio::test(start_paused = true)]
async fn plugin_quota_and_error_budget() {
    let runtime = test_runtime().await;
    let update_no = Arc::new(AtomicU32::new(0));
    let oversize_denied = Arc::new(AtomicU32::new(0));
    runtime
        .register(Box::new(QuotaPlugin {
            update_no: Arc::clone(&update_no),
            oversize_denied: Arc::clone(&oversize_denied),
        }))
        .unwrap();

    runtime.enable("quota", true).await.unwrap();

    for _ in 0..400 {
        if runtime.state_of("quota").unwrap() == PluginState::Error {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Update 2 succeeded, so the error budget restarted there: update 1
    // failed, update 2 reset the count, updates 3..7 exhausted it.
    assert_eq!(runtime.state_of("quota").unwrap(), PluginState::Error);
    assert_eq!(oversize_denied.load(Ordering::SeqCst), 1);
    assert_eq!(update_no.load(Ordering::SeqCst), 7);

    let rows = runtime.list().await;
    let row = rows.iter().find(|r| r.name == "quota").unwrap();
    assert!(!row.enabled);
    assert_eq!(row.update_count, 1);
    assert_eq!(row.error_count, 6);
}

#[tokio::test]
async fn provisioning_happy_path_through_portal() {
    let radio = MockRadio::new();
    let radio_state = radio.state();
    let store = Arc::new(MemoryStore::new());
    let creds = CredentialStore::new(store.clone(), Box::new(XorCipher));
    let fsm = Arc::new(StdMutex::new(WifiFsm::new(
        Arc::new(radio),
        creds,
        Box::new(NullPortal),
        WifiConfig::default(),
    )));

    // No saved credentials: the machine opens the provisioning AP
    {
        let mut fsm = fsm.lock().unwrap();
        fsm.tick();
        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::PortalActive);
        assert!(fsm.ap_ssid().unwrap().starts_with("Pin-Device-"));
    }
    assert!(radio_state.lock().unwrap().ap_active);

    // The portal receives credentials over HTTP
    let request = Request::new(Method::Post, "/api/wifi/connect")
        .with_body(r#"{"ssid": "HomeNet", "password": "hunter2"}"#);
    let response = portal::connect_handler(&fsm, &request);
    assert_eq!(response.status, 200);
    assert_eq!(response.body_json()["success"], true);

    // The FSM picks them up, associates and persists
    {
        let mut fsm = fsm.lock().unwrap();
        fsm.tick(); // portal -> connecting
        fsm.tick(); // initiate
        fsm.tick(); // latency
        fsm.tick(); // got-ip
        assert_eq!(fsm.state(), WifiState::Connected);
        fsm.tick(); // persist
        assert!(fsm.has_saved_credentials());
        assert_eq!(fsm.current_ssid().unwrap(), "HomeNet");
    }

    // Status endpoint reflects the connection
    let response = portal::status_handler(&fsm);
    let body = response.body_json();
    assert_eq!(body["state"], "connected");
    assert_eq!(body["connected"], true);
    assert_eq!(body["ssid"], "HomeNet");
}

/// Serve one HTTP response; the body stops after `serve_bytes` and the
/// connection is held open until the test finishes.
async fn serve_stalling(body_len: usize, serve_bytes: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body_len
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(&vec![0xABu8; serve_bytes]).await;
            let _ = stream.flush().await;
            // Hold the connection so the download stalls mid-stream
            tokio::time::sleep(Duration::from_secs(300)).await;
        }
    });
    format!("http://{}", addr)
}

async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(&body).await;
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn ota_cancellation_leaves_slot_uncommitted() {
    // 100-byte image of which only 37 ever arrive
    let firmware_url = serve_stalling(100, 37).await;
    let manifest = format!(
        r#"{{"tag_name": "v2.0.0", "body": "",
             "assets": [{{"name": "pin_firmware.bin",
                          "browser_download_url": "{}/fw", "size": 100}}]}}"#,
        firmware_url
    );
    let manifest_url = serve_once(manifest.into_bytes()).await;

    let slot = Arc::new(MockSlot::new());
    let engine = OtaEngine::new(slot.clone(), "1.0.0");
    assert!(engine.check_update(&manifest_url).await.unwrap());

    let progress = Arc::new(AtomicU32::new(0));
    let (done_tx, done_rx) = std::sync::mpsc::channel::<bool>();
    let progress_clone = Arc::clone(&progress);
    Arc::clone(&engine)
        .start_update(
            Box::new(move |percent, _dl, _total| {
                progress_clone.store(percent as u32, Ordering::SeqCst);
            }),
            Box::new(move |ok, _msg| {
                let _ = done_tx.send(ok);
            }),
        )
        .unwrap();

    // Wait until the stalled download reports 37%
    for _ in 0..100 {
        if progress.load(Ordering::SeqCst) >= 37 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(progress.load(Ordering::SeqCst), 37);

    engine.cancel_update().unwrap();

    let ok = tokio::task::spawn_blocking(move || done_rx.recv().unwrap())
        .await
        .unwrap();
    assert!(!ok);

    let status = engine.status();
    assert_eq!(status.state, OtaState::Error);
    assert_eq!(status.error_message, "cancelled");

    // The alternate slot was never committed: next boot runs the old image
    let slot_state = slot.state();
    let slot_state = slot_state.lock().unwrap();
    assert!(slot_state.aborted);
    assert!(!slot_state.committed);
    assert_eq!(slot_state.written.len(), 37);
    assert_eq!(slot_state.reboots, 0);
}
