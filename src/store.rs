use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};

/// Namespaces used by the subsystems. Keys never cross namespaces.
pub const NS_WIFI: &str = "pin_wifi";
pub const NS_CANVAS: &str = "pin_canvas";
pub const NS_IMAGES: &str = "pin_images";
pub const NS_PLUGINS: &str = "plugins";
pub const NS_OTA: &str = "ota_config";

/// Error type for key-value store operations.
#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Io(io::Error),
    InvalidKey(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "Key not found"),
            StoreError::Io(e) => write!(f, "Store I/O error: {}", e),
            StoreError::InvalidKey(k) => write!(f, "Invalid store key: {}", k),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(e)
        }
    }
}

/// Typed interface to the persistent key-value store.
///
/// The core is agnostic to the backing implementation; it only relies on
/// namespaced blobs and an explicit commit point. Implementations are
/// thread-safe.
pub trait KvStore: Send + Sync {
    fn get_blob(&self, ns: &str, key: &str) -> Result<Vec<u8>, StoreError>;
    fn set_blob(&self, ns: &str, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn erase(&self, ns: &str, key: &str) -> Result<(), StoreError>;
    fn commit(&self, ns: &str) -> Result<(), StoreError>;

    /// All keys currently present in a namespace, unordered.
    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError>;

    fn get_string(&self, ns: &str, key: &str) -> Result<String, StoreError> {
        let bytes = self.get_blob(ns, key)?;
        String::from_utf8(bytes).map_err(|_| StoreError::InvalidKey(key.to_string()))
    }

    fn set_string(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_blob(ns, key, value.as_bytes())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get_blob(&self, ns: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let data = self.data.lock().unwrap();
        data.get(ns)
            .and_then(|m| m.get(key))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn set_blob(&self, ns: &str, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        data.entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn erase(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        match data.get_mut(ns).and_then(|m| m.remove(key)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    fn commit(&self, _ns: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(ns)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Directory-backed store: one directory per namespace, one file per key.
///
/// This is the host-build stand-in for the device's NVS partition. Writes
/// land on disk immediately; `commit` is a sync point.
pub struct FileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Opened file store at {}", root.display());
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, ns: &str, key: &str) -> Result<PathBuf, StoreError> {
        if ns.is_empty() || key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(StoreError::InvalidKey(format!("{}/{}", ns, key)));
        }
        Ok(self.root.join(ns).join(key))
    }
}

impl KvStore for FileStore {
    fn get_blob(&self, ns: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(ns, key)?;
        Ok(fs::read(path)?)
    }

    fn set_blob(&self, ns: &str, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(ns, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn erase(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap();
        let path = self.path_for(ns, key)?;
        fs::remove_file(path).map_err(StoreError::from)
    }

    fn commit(&self, ns: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.root.join(ns);
        if let Ok(handle) = fs::File::open(&dir) {
            if let Err(e) = handle.sync_all() {
                warn!("Store commit sync failed for {}: {}", ns, e);
            }
        }
        Ok(())
    }

    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.root.join(ns);
        let mut keys = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if let Some(name) = entry.file_name().to_str() {
                        keys.push(name.to_string());
                    }
                }
                Ok(keys)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(keys),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
