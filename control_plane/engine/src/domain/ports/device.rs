//! Device port

use crate::domain::ports::{LifeCycle, RemoteObject};
use crate::domain::value_objects::{DataType, UsageState};
use crate::domain::RemoteError;
use async_trait::async_trait;

#[async_trait]
pub trait Device: RemoteObject + LifeCycle {
    async fn identifier(&self) -> Result<String, RemoteError>;

    async fn label(&self) -> Result<String, RemoteError>;

    async fn software_profile(&self) -> Result<String, RemoteError>;

    async fn usage_state(&self) -> Result<UsageState, RemoteError>;

    /// Fails with `PartialConfiguration` or `InvalidConfiguration`
    async fn configure(&self, properties: &[DataType]) -> Result<(), RemoteError>;

    /// `Ok(false)` when the device declines without raising
    async fn allocate_capacity(&self, properties: &[DataType]) -> Result<bool, RemoteError>;

    async fn deallocate_capacity(&self, properties: &[DataType]) -> Result<(), RemoteError>;
}
