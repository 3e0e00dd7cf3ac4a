//! DeviceManager port, as seen by the domain

use crate::domain::ports::{Device, RemoteObject};
use crate::domain::RemoteError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait DeviceManagerRef: RemoteObject {
    async fn identifier(&self) -> Result<String, RemoteError>;

    async fn label(&self) -> Result<String, RemoteError>;

    /// Path of the node deployment descriptor
    async fn device_configuration_profile(&self) -> Result<String, RemoteError>;

    async fn registered_devices(&self) -> Result<Vec<Arc<dyn Device>>, RemoteError>;

    async fn component_implementation_id(&self, instantiation_id: &str)
    -> Result<String, RemoteError>;

    async fn shutdown(&self) -> Result<(), RemoteError>;
}
