//! ConnectionManager port
//! The lookups an endpoint consults to resolve itself. Application-scoped and
//! domain-scoped managers answer them differently.

use crate::domain::ports::ObjectRef;
use crate::domain::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Component or device by instantiation id, falling back to device managers
    async fn resolve_component(&self, identifier: &str) -> Option<ObjectRef>;

    async fn resolve_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>>;

    async fn resolve_find_by_naming_service(&self, name: &str) -> Option<ObjectRef>;

    async fn resolve_device_that_loaded(&self, component_id: &str) -> Option<ObjectRef>;

    async fn resolve_device_used_by_component(
        &self,
        component_id: &str,
        uses_id: &str,
    ) -> Option<ObjectRef>;

    async fn resolve_device_used_by_application(&self, uses_id: &str) -> Option<ObjectRef>;

    /// Give back the connection count taken when an event channel was resolved
    async fn release_event_channel(&self, name: &str);
}
