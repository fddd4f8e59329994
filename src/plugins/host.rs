/*
 *  plugins/host.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Production host API - allow-listed HTTP, persisted config, time
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

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Local;
use log::warn;
use reqwest::Client;

use crate::plugins::api::{BoxFuture, HostApi, PluginError};
use crate::store::{KvStore, StoreError, NS_PLUGINS};

/// Domains plugin HTTP calls may reach. Compiled in; everything else is
/// denied with `NotAllowed`.
pub const ALLOWED_DOMAINS: &[&str] = &[
    "api.github.com",
    "api.openweathermap.org",
    "httpbin.org",
    "jsonplaceholder.typicode.com",
];

const GET_TIMEOUT: Duration = Duration::from_secs(5);
const POST_TIMEOUT: Duration = Duration::from_secs(10);

/// Extract the host part of a URL: the text between `://` and the first
/// `/`, `:` or `?`.
fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let end = rest.find(|c| c == '/' || c == ':' || c == '?').unwrap_or(rest.len());
    let host = &rest[..end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn check_allowed(url: &str) -> Result<(), PluginError> {
    let host = url_host(url)
        .ok_or_else(|| PluginError::InvalidArgument(format!("malformed URL: {}", url)))?;
    if ALLOWED_DOMAINS.iter().any(|&d| d == host) {
        Ok(())
    } else {
        warn!("Plugin HTTP call to non-allow-listed host: {}", host);
        Err(PluginError::NotAllowed)
    }
}

/// Host API backed by the real system: reqwest HTTP, the persistent KV
/// store, and the local clock.
pub struct SystemHost {
    client: Client,
    store: Arc<dyn KvStore>,
}

impl SystemHost {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("PinFrame/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, store }
    }
}

impl HostApi for SystemHost {
    fn log(&self, level: log::Level, tag: &str, message: &str) {
        log::log!(target: "plugin", level, "[{}] {}", tag, message);
    }

    fn http_get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, PluginError>> {
        Box::pin(async move {
            check_allowed(url)?;
            let response = self
                .client
                .get(url)
                .timeout(GET_TIMEOUT)
                .send()
                .await
                .map_err(|e| PluginError::Http(e.to_string()))?;
            let response = response
                .error_for_status()
                .map_err(|e| PluginError::Http(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| PluginError::Http(e.to_string()))
        })
    }

    fn http_post<'a>(
        &'a self,
        url: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<String, PluginError>> {
        Box::pin(async move {
            check_allowed(url)?;
            let response = self
                .client
                .post(url)
                .timeout(POST_TIMEOUT)
                .header("Content-Type", "application/json")
                .body(body.to_string())
                .send()
                .await
                .map_err(|e| PluginError::Http(e.to_string()))?;
            let response = response
                .error_for_status()
                .map_err(|e| PluginError::Http(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| PluginError::Http(e.to_string()))
        })
    }

    fn config_get(&self, key: &str) -> Result<String, PluginError> {
        match self.store.get_string(NS_PLUGINS, key) {
            Ok(value) => Ok(value),
            Err(StoreError::NotFound) => Err(PluginError::NotFound),
            Err(e) => Err(PluginError::Storage(e.to_string())),
        }
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), PluginError> {
        self.store
            .set_string(NS_PLUGINS, key, value)
            .and_then(|_| self.store.commit(NS_PLUGINS))
            .map_err(|e| PluginError::Storage(e.to_string()))
    }

    fn config_delete(&self, key: &str) -> Result<(), PluginError> {
        match self.store.erase(NS_PLUGINS, key) {
            Ok(()) | Err(StoreError::NotFound) => self
                .store
                .commit(NS_PLUGINS)
                .map_err(|e| PluginError::Storage(e.to_string())),
            Err(e) => Err(PluginError::Storage(e.to_string())),
        }
    }

    fn timestamp_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn format_time(&self, fmt: &str) -> String {
        use std::fmt::Write;

        // An invalid plugin-supplied pattern must not take the worker
        // down; fall back to a fixed format instead.
        let now = Local::now();
        let mut out = String::new();
        if write!(out, "{}", now.format(fmt)).is_err() {
            out.clear();
            let _ = write!(out, "{}", now.format("%H:%M:%S"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_url_host_extraction() {
        assert_eq!(url_host("https://api.github.com/repos/x"), Some("api.github.com"));
        assert_eq!(url_host("http://httpbin.org:8080/get"), Some("httpbin.org"));
        assert_eq!(url_host("https://wttr.in?format=j1"), Some("wttr.in"));
        assert_eq!(url_host("no-scheme.example"), None);
        assert_eq!(url_host("https:///"), None);
    }

    #[test]
    fn test_allow_list() {
        assert!(check_allowed("https://api.github.com/repos/x/releases").is_ok());
        assert!(matches!(
            check_allowed("https://evil.example.com/"),
            Err(PluginError::NotAllowed)
        ));
        // Prefix tricks do not pass an exact host match
        assert!(matches!(
            check_allowed("https://api.github.com.evil.example/"),
            Err(PluginError::NotAllowed)
        ));
        assert!(matches!(
            check_allowed("garbage"),
            Err(PluginError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config_persistence() {
        let store = Arc::new(MemoryStore::new());
        let host = SystemHost::new(store.clone());

        host.config_set("plugin_clock_format", "%H:%M").unwrap();
        assert_eq!(host.config_get("plugin_clock_format").unwrap(), "%H:%M");

        host.config_delete("plugin_clock_format").unwrap();
        assert!(matches!(
            host.config_get("plugin_clock_format"),
            Err(PluginError::NotFound)
        ));

        // Deleting a missing key is tolerated
        host.config_delete("plugin_clock_format").unwrap();
    }

    #[test]
    fn test_format_time_produces_output() {
        let host = SystemHost::new(Arc::new(MemoryStore::new()));
        let formatted = host.format_time("%H:%M");
        assert_eq!(formatted.len(), 5);
        assert!(formatted.contains(':'));
    }

    #[test]
    fn test_format_time_bad_pattern_falls_back() {
        let host = SystemHost::new(Arc::new(MemoryStore::new()));
        let formatted = host.format_time("%Q");
        // Fallback is HH:MM:SS
        assert_eq!(formatted.len(), 8);
    }
}
