//! Event channel factory port

use crate::domain::ports::ObjectRef;
use crate::domain::RemoteError;
use async_trait::async_trait;

#[async_trait]
pub trait EventChannelFactory: Send + Sync {
    async fn create_channel(&self, name: &str) -> Result<ObjectRef, RemoteError>;

    async fn destroy_channel(&self, name: &str) -> Result<(), RemoteError>;
}
