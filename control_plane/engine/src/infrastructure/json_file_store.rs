//! JSON File Store
//! PersistenceStore backed by a single JSON document mapping keys to values.
//! The whole document is rewritten on every change, through a temporary file
//! renamed into place so a crash never leaves a torn file behind.

use crate::domain::ports::PersistenceStore;
use crate::domain::PersistenceError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct JsonFileStore {
    path: PathBuf,
    /// `None` until opened
    values: Mutex<Option<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, String>, PersistenceError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PersistenceError::Io(format!(
                "failed to read '{}': {e}",
                path.display()
            ))),
        }
    }

    async fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| PersistenceError::Io(format!("failed to encode store: {e}")))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PersistenceError::Io(format!("failed to create '{}': {e}", parent.display()))
                })?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| PersistenceError::Io(format!("failed to write '{}': {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            PersistenceError::Io(format!("failed to replace '{}': {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl PersistenceStore for JsonFileStore {
    async fn open(&self) -> Result<(), PersistenceError> {
        let mut values = self.values.lock().await;
        if values.is_some() {
            return Ok(());
        }
        let loaded = Self::load(&self.path).await?;
        info!(path = %self.path.display(), keys = loaded.len(), "Opened persistence file");
        *values = Some(loaded);
        Ok(())
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        let value = String::from_utf8(value.to_vec()).map_err(|_| {
            PersistenceError::Io(format!("value for '{key}' is not valid UTF-8"))
        })?;
        let mut guard = self.values.lock().await;
        let values = guard.as_mut().ok_or(PersistenceError::NotOpen)?;
        values.insert(key.to_string(), value);
        self.flush(values).await?;
        debug!(key = %key, "Stored value");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let guard = self.values.lock().await;
        let values = guard.as_ref().ok_or(PersistenceError::NotOpen)?;
        Ok(values.get(key).map(|v| v.as_bytes().to_vec()))
    }

    async fn del(&self, key: &str) -> Result<(), PersistenceError> {
        let mut guard = self.values.lock().await;
        let values = guard.as_mut().ok_or(PersistenceError::NotOpen)?;
        if values.remove(key).is_some() {
            self.flush(values).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PersistenceError> {
        let mut guard = self.values.lock().await;
        if let Some(values) = guard.take() {
            self.flush(&values).await?;
            debug!(path = %self.path.display(), "Closed persistence file");
        }
        Ok(())
    }
}
