//! Liveness mode persistence
//!
//! The liveness mode is a per-user integer kept in a property store under
//! `persist.vendor.faceid.livenessmode<user>`, where the vendor algorithm
//! reads it.

use protocol::UserId;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

const LIVENESS_KEY_PREFIX: &str = "persist.vendor.faceid.livenessmode";

/// Property store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Property store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Property store is corrupt: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize properties: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Key/value property store
pub trait PropertyStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Property key holding the liveness mode of `user_id`
pub fn liveness_key(user_id: UserId) -> String {
    format!("{}{}", LIVENESS_KEY_PREFIX, user_id.0)
}

/// Properties kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// Properties persisted as a flat TOML table
pub struct TomlPropertyStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl TomlPropertyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PropertyStore for TomlPropertyStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut values = self.read()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string(&values)?)?;

        debug!("Stored {} in {}", key, self.path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.get(key).cloned())
    }
}
