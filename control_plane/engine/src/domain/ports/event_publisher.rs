//! Event publisher port
//! An event channel that accepts domain notifications.

use crate::domain::value_objects::DomainEvent;
use crate::domain::RemoteError;
use async_trait::async_trait;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), RemoteError>;
}
