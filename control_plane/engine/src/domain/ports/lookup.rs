//! Lookup ports consulted while resolving connection endpoints

use crate::domain::ports::ObjectRef;
use crate::domain::Result;
use async_trait::async_trait;

/// Domain-wide named objects
#[async_trait]
pub trait DomainLookup: Send + Sync {
    /// `Ok(None)` when the type is known but nothing matches.
    /// Looking up an event channel counts as one more connection to it.
    async fn lookup_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>>;

    async fn increment_event_channel_connections(&self, name: &str) -> u32;

    async fn decrement_event_channel_connections(&self, name: &str) -> u32;
}

#[async_trait]
pub trait ComponentLookup: Send + Sync {
    async fn lookup_component_by_instantiation_id(&self, identifier: &str) -> Option<ObjectRef>;

    async fn lookup_device_manager_by_instantiation_id(&self, identifier: &str) -> Option<ObjectRef>;
}

/// Devices related to the components of one application
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    async fn lookup_device_that_loaded_component(&self, component_id: &str) -> Option<ObjectRef>;

    async fn lookup_device_used_by_component(
        &self,
        component_id: &str,
        uses_id: &str,
    ) -> Option<ObjectRef>;

    async fn lookup_device_used_by_application(&self, uses_id: &str) -> Option<ObjectRef>;
}
