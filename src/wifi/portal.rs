/*
 *  wifi/portal.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Captive-portal HTTP handlers
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

use log::warn;
use serde::Deserialize;
use serde_json::json;

use crate::web::types::{Request, Response};
use crate::wifi::fsm::WifiFsm;
use crate::wifi::AP_IP;

/// Where unmatched portal GETs are sent.
pub fn portal_url() -> String {
    format!("http://{}/config", AP_IP)
}

/// 302 used as the router fallback while the portal is active; captive
/// OS probes land here and get pushed to the config page.
pub fn redirect_handler(_request: Request) -> Response {
    Response::redirect(&portal_url())
}

/// `GET /api/wifi/scan` - visible networks, strongest first.
pub fn scan_handler(fsm: &Arc<Mutex<WifiFsm>>) -> Response {
    let radio = fsm.lock().unwrap().radio();
    match radio.scan() {
        Ok(mut networks) => {
            networks.sort_by(|a, b| b.rssi.cmp(&a.rssi));
            Response::ok_json(&json!({ "networks": networks }))
        }
        Err(e) => {
            warn!("Wi-Fi scan failed: {}", e);
            Response::error(500, "Scan failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectBody {
    ssid: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/wifi/connect` - validate and hand the credentials to the
/// FSM. The handler never writes the credential store itself.
pub fn connect_handler(fsm: &Arc<Mutex<WifiFsm>>, request: &Request) -> Response {
    let body: ConnectBody = match request.json() {
        Ok(body) => body,
        Err(e) => return Response::error(400, &format!("Invalid JSON: {}", e)),
    };

    match fsm.lock().unwrap().submit_credentials(&body.ssid, &body.password) {
        Ok(()) => Response::ok_json(&json!({ "success": true })),
        Err(message) => Response::error(400, &message),
    }
}

/// `GET /api/status` on the portal - provisioning state for the UI.
pub fn status_handler(fsm: &Arc<Mutex<WifiFsm>>) -> Response {
    let status = fsm.lock().unwrap().status();
    Response::ok_json(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::web::types::Method;
    use crate::wifi::creds::{CredentialStore, XorCipher};
    use crate::wifi::fsm::{NullPortal, WifiConfig, WifiState};
    use crate::wifi::radio::{AuthMode, MockRadio, NetworkInfo};

    fn portal_fsm(radio: MockRadio) -> Arc<Mutex<WifiFsm>> {
        let creds = CredentialStore::new(Arc::new(MemoryStore::new()), Box::new(XorCipher));
        Arc::new(Mutex::new(WifiFsm::new(
            Arc::new(radio),
            creds,
            Box::new(NullPortal),
            WifiConfig::default(),
        )))
    }

    #[test]
    fn test_redirect() {
        let response = redirect_handler(Request::new(Method::Get, "/generate_204"));
        assert_eq!(response.status, 302);
        assert_eq!(response.headers[0].1, "http://192.168.4.1/config");
    }

    #[test]
    fn test_scan_sorted_by_rssi() {
        let radio = MockRadio::with_networks(vec![
            NetworkInfo {
                ssid: "weak".to_string(),
                rssi: -80,
                auth: AuthMode::Wpa2Psk,
                channel: 6,
            },
            NetworkInfo {
                ssid: "strong".to_string(),
                rssi: -40,
                auth: AuthMode::Open,
                channel: 1,
            },
        ]);
        let fsm = portal_fsm(radio);

        let response = scan_handler(&fsm);
        assert_eq!(response.status, 200);
        let body = response.body_json();
        assert_eq!(body["networks"][0]["ssid"], "strong");
        assert_eq!(body["networks"][1]["ssid"], "weak");
    }

    #[test]
    fn test_connect_sets_config_received() {
        let fsm = portal_fsm(MockRadio::new());
        let request = Request::new(Method::Post, "/api/wifi/connect")
            .with_body(r#"{"ssid": "HomeNet", "password": "hunter2"}"#);

        let response = connect_handler(&fsm, &request);
        assert_eq!(response.status, 200);
        assert_eq!(response.body_json()["success"], true);

        // Drive the FSM into the portal, then past it
        let mut fsm = fsm.lock().unwrap();
        fsm.tick();
        fsm.tick();
        fsm.tick();
        fsm.tick();
        assert_eq!(fsm.state(), WifiState::Connecting);
    }

    #[test]
    fn test_connect_rejects_bad_input() {
        let fsm = portal_fsm(MockRadio::new());

        let request = Request::new(Method::Post, "/api/wifi/connect").with_body("not json");
        assert_eq!(connect_handler(&fsm, &request).status, 400);

        let request = Request::new(Method::Post, "/api/wifi/connect")
            .with_body(r#"{"ssid": "", "password": "x"}"#);
        assert_eq!(connect_handler(&fsm, &request).status, 400);
    }

    #[test]
    fn test_status_payload() {
        let fsm = portal_fsm(MockRadio::new());
        let response = status_handler(&fsm);
        let body = response.body_json();
        assert_eq!(body["state"], "idle");
        assert_eq!(body["connected"], false);
    }
}
