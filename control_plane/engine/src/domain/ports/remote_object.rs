//! Remote object handles
//! Every handle is non-owning. Liveness is checked with `non_existent`, never assumed.

use crate::domain::ports::EventPublisher;
use crate::domain::RemoteError;
use async_trait::async_trait;
use std::sync::Arc;

pub type ObjectRef = Arc<dyn RemoteObject>;

#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Stringified reference, stable for the lifetime of the object
    fn ior(&self) -> String;

    /// Check whether the object has gone away
    async fn non_existent(&self) -> bool {
        false
    }

    fn as_uses_port(&self) -> Option<&dyn UsesPort> {
        None
    }

    fn as_port_supplier(&self) -> Option<&dyn PortSupplier> {
        None
    }

    fn as_life_cycle(&self) -> Option<&dyn LifeCycle> {
        None
    }

    fn as_event_publisher(&self) -> Option<&dyn EventPublisher> {
        None
    }
}

/// Port that initiates a connection
#[async_trait]
pub trait UsesPort: Send + Sync {
    async fn connect_port(&self, provides: ObjectRef, connection_id: &str) -> Result<(), RemoteError>;
    async fn disconnect_port(&self, connection_id: &str) -> Result<(), RemoteError>;
}

/// Object that hands out its ports by name
#[async_trait]
pub trait PortSupplier: Send + Sync {
    async fn get_port(&self, name: &str) -> Result<ObjectRef, RemoteError>;
}

#[async_trait]
pub trait LifeCycle: Send + Sync {
    async fn initialize(&self) -> Result<(), RemoteError>;
    async fn release_object(&self) -> Result<(), RemoteError>;
}

pub async fn object_exists(object: &ObjectRef) -> bool {
    !object.non_existent().await
}
