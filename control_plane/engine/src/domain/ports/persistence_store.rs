//! Persistence store port
//! Opaque key/value store. Values are serialized records.

use crate::domain::PersistenceError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn open(&self) -> Result<(), PersistenceError>;

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    async fn del(&self, key: &str) -> Result<(), PersistenceError>;

    async fn close(&self) -> Result<(), PersistenceError>;
}
