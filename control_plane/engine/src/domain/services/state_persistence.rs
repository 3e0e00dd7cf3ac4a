//! State persistence
//! Typed access to the key/value store. Every failure is logged and swallowed:
//! the in-memory registries stay authoritative.

use crate::domain::ports::PersistenceStore;
use crate::domain::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct StatePersistence {
    store: Option<Arc<dyn PersistenceStore>>,
}

impl StatePersistence {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store: Some(store) }
    }

    /// No backing store, every operation is a no-op
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let Some(store) = &self.store else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(key = %key, error = %e, "Unable to serialize state");
                return;
            }
        };
        if let Err(e) = store.store(key, &bytes).await {
            error!(key = %key, error = %e, "Error persisting state");
        }
    }

    /// `None` when the key is absent, unreadable or corrupt
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        let bytes = match store.fetch(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "No persisted state");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Error loading persisted state");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                let error = PersistenceError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %error, "Ignoring persisted state");
                None
            }
        }
    }

    pub async fn open(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.open().await {
                error!(error = %e, "Unable to open persistence store");
            }
        }
    }

    pub async fn close(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.close().await {
                warn!(error = %e, "Error closing persistence store");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockPersistenceStore;

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let mut store = MockPersistenceStore::new();
        store
            .expect_store()
            .times(1)
            .returning(|_, _| Err(PersistenceError::Io("disk full".into())));

        let persistence = StatePersistence::new(Arc::new(store));
        persistence.save("DEVICES", &vec!["a", "b"]).await;
    }

    #[tokio::test]
    async fn test_corrupt_value_loads_as_none() {
        let mut store = MockPersistenceStore::new();
        store
            .expect_fetch()
            .returning(|_| Ok(Some(b"{not json".to_vec())));

        let persistence = StatePersistence::new(Arc::new(store));
        let loaded: Option<Vec<String>> = persistence.load("DEVICES").await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let mut store = MockPersistenceStore::new();
        let payload = serde_json::to_vec(&vec!["gpp"]).unwrap();
        store
            .expect_fetch()
            .withf(|key| key == "DEVICES")
            .returning(move |_| Ok(Some(payload.clone())));

        let persistence = StatePersistence::new(Arc::new(store));
        let loaded: Option<Vec<String>> = persistence.load("DEVICES").await;
        assert_eq!(loaded, Some(vec!["gpp".to_string()]));
    }

    #[tokio::test]
    async fn test_disabled_is_a_no_op() {
        let persistence = StatePersistence::disabled();
        persistence.save("DEVICES", &Vec::<String>::new()).await;
        let loaded: Option<Vec<String>> = persistence.load("DEVICES").await;
        assert!(loaded.is_none());
        assert!(!persistence.is_enabled());
    }
}
