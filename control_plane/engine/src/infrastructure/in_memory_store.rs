//! In-Memory Store
//! PersistenceStore that lives as long as the process. Clones share the same map.

use crate::domain::ports::PersistenceStore;
use crate::domain::PersistenceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    values: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn open(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        trace!(key = %key, bytes = value.len(), "Storing value");
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn del(&self, key: &str) -> Result<(), PersistenceError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_fetch_delete() {
        let store = InMemoryStore::new();
        store.store("DEVICES", b"[]").await.unwrap();

        assert_eq!(store.fetch("DEVICES").await.unwrap(), Some(b"[]".to_vec()));
        assert_eq!(store.fetch("SERVICES").await.unwrap(), None);

        store.del("DEVICES").await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_values() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.store("k", b"v").await.unwrap();

        assert_eq!(other.fetch("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
