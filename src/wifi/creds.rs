/*
 *  wifi/creds.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Credential persistence - versioned cipher over the KV store
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
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{info, warn};

use crate::store::{KvStore, StoreError, NS_WIFI};

/// Stored alongside the credentials so a stronger cipher can migrate the
/// format later.
const FORMAT_VERSION: u8 = 1;

const KEY_SSID: &str = "ssid";
const KEY_PASSWORD: &str = "password";
const KEY_VERSION: &str = "version";

/// Station credentials as handed over by the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

/// Error type for credential operations.
#[derive(Debug)]
pub enum CredsError {
    Corrupt(String),
    Storage(StoreError),
}

impl fmt::Display for CredsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredsError::Corrupt(msg) => write!(f, "Stored credentials corrupt: {}", msg),
            CredsError::Storage(e) => write!(f, "Credential storage failed: {}", e),
        }
    }
}

impl std::error::Error for CredsError {}

impl From<StoreError> for CredsError {
    fn from(e: StoreError) -> Self {
        CredsError::Storage(e)
    }
}

/// Password-at-rest transform.
///
/// The default [`XorCipher`] is an obfuscation, not cryptography; the
/// intended production implementation wraps a platform secret mechanism
/// (NVS encryption, a TPM-backed key) behind this same trait. The stored
/// `version` field exists so such a cipher can migrate old entries.
pub trait CredentialCipher: Send + Sync {
    fn seal(&self, plaintext: &str) -> String;
    fn open(&self, sealed: &str) -> Result<String, CredsError>;
}

/// XOR with a compiled key, then Base64. Format version 1.
pub struct XorCipher;

const XOR_KEY: &[u8] = b"PinFrame-credential-key";

fn xor_bytes(input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ XOR_KEY[i % XOR_KEY.len()])
        .collect()
}

impl CredentialCipher for XorCipher {
    fn seal(&self, plaintext: &str) -> String {
        BASE64.encode(xor_bytes(plaintext.as_bytes()))
    }

    fn open(&self, sealed: &str) -> Result<String, CredsError> {
        let decoded = BASE64
            .decode(sealed)
            .map_err(|e| CredsError::Corrupt(format!("base64: {}", e)))?;
        String::from_utf8(xor_bytes(&decoded))
            .map_err(|_| CredsError::Corrupt("not valid UTF-8 after decrypt".to_string()))
    }
}

/// Persisted credentials in the `pin_wifi` namespace: SSID in plaintext,
/// password sealed by the cipher, plus the format version byte.
pub struct CredentialStore {
    store: Arc<dyn KvStore>,
    cipher: Box<dyn CredentialCipher>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KvStore>, cipher: Box<dyn CredentialCipher>) -> Self {
        Self { store, cipher }
    }

    pub fn save(&self, creds: &Credentials) -> Result<(), CredsError> {
        self.store.set_string(NS_WIFI, KEY_SSID, &creds.ssid)?;
        self.store
            .set_string(NS_WIFI, KEY_PASSWORD, &self.cipher.seal(&creds.password))?;
        self.store.set_blob(NS_WIFI, KEY_VERSION, &[FORMAT_VERSION])?;
        self.store.commit(NS_WIFI)?;
        info!("Saved Wi-Fi credentials for '{}'", creds.ssid);
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Credentials>, CredsError> {
        let ssid = match self.store.get_string(NS_WIFI, KEY_SSID) {
            Ok(ssid) => ssid,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sealed = match self.store.get_string(NS_WIFI, KEY_PASSWORD) {
            Ok(sealed) => sealed,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let password = self.cipher.open(&sealed)?;
        Ok(Some(Credentials { ssid, password }))
    }

    pub fn has_saved(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    pub fn clear(&self) -> Result<(), CredsError> {
        for key in [KEY_SSID, KEY_PASSWORD, KEY_VERSION] {
            match self.store.erase(NS_WIFI, key) {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(e) => {
                    warn!("Failed to erase credential key {}: {}", key, e);
                    return Err(e.into());
                }
            }
        }
        self.store.commit(NS_WIFI)?;
        info!("Cleared saved Wi-Fi credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStore::new()), Box::new(XorCipher))
    }

    #[test]
    fn test_xor_cipher_round_trip() {
        let cipher = XorCipher;
        let sealed = cipher.seal("hunter2");
        assert_ne!(sealed, "hunter2");
        assert_eq!(cipher.open(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn test_cipher_rejects_garbage() {
        let cipher = XorCipher;
        assert!(cipher.open("@@not-base64@@").is_err());
    }

    #[test]
    fn test_save_load_clear() {
        let creds_store = store();
        assert!(!creds_store.has_saved());
        assert!(creds_store.load().unwrap().is_none());

        let creds = Credentials {
            ssid: "HomeNet".to_string(),
            password: "hunter2".to_string(),
        };
        creds_store.save(&creds).unwrap();

        assert!(creds_store.has_saved());
        assert_eq!(creds_store.load().unwrap().unwrap(), creds);

        creds_store.clear().unwrap();
        assert!(!creds_store.has_saved());
        // Clearing twice is harmless
        creds_store.clear().unwrap();
    }

    #[test]
    fn test_password_not_stored_in_plaintext() {
        let kv = Arc::new(MemoryStore::new());
        let creds_store = CredentialStore::new(kv.clone(), Box::new(XorCipher));
        creds_store
            .save(&Credentials {
                ssid: "HomeNet".to_string(),
                password: "hunter2".to_string(),
            })
            .unwrap();

        let raw = kv.get_string(NS_WIFI, "password").unwrap();
        assert_ne!(raw, "hunter2");
        // SSID is stored plaintext
        assert_eq!(kv.get_string(NS_WIFI, "ssid").unwrap(), "HomeNet");
        assert_eq!(kv.get_blob(NS_WIFI, "version").unwrap(), vec![1]);
    }
}
