//! Object broker port
//! Turns persisted stringified references back into typed handles.

use crate::domain::ports::{Device, DeviceManagerRef, DomainManagerRef, ObjectRef, RemoteAllocationManager};
use std::sync::Arc;

pub trait ObjectBroker: Send + Sync {
    fn object(&self, ior: &str) -> Option<ObjectRef>;

    fn device(&self, ior: &str) -> Option<Arc<dyn Device>>;

    fn device_manager(&self, ior: &str) -> Option<Arc<dyn DeviceManagerRef>>;

    fn domain_manager(&self, ior: &str) -> Option<Arc<dyn DomainManagerRef>>;

    fn allocation_manager(&self, ior: &str) -> Option<Arc<dyn RemoteAllocationManager>>;
}
