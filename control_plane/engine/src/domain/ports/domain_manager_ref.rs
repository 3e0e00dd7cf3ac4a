//! DomainManager and AllocationManager ports
//! Used by device managers to register, and by peer domains to federate allocations.

use crate::domain::entities::{AllocationRequest, AllocationResponse, AllocationStatus, DeviceLocation};
use crate::domain::ports::{Device, DeviceManagerRef, ObjectRef, RemoteObject};
use crate::domain::{DomainError, RemoteError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait DomainManagerRef: RemoteObject {
    async fn identifier(&self) -> Result<String, RemoteError>;

    async fn name(&self) -> Result<String, RemoteError>;

    async fn allocation_manager(&self) -> Result<Arc<dyn RemoteAllocationManager>, RemoteError>;

    async fn register_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<(), DomainError>;

    async fn unregister_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<(), DomainError>;

    async fn register_device(
        &self,
        device: Option<Arc<dyn Device>>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<(), DomainError>;

    async fn unregister_device(&self, device: Option<Arc<dyn Device>>) -> Result<(), DomainError>;

    async fn register_service(
        &self,
        service: Option<ObjectRef>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
        name: &str,
    ) -> Result<(), DomainError>;

    async fn unregister_service(&self, service: Option<ObjectRef>, name: &str)
    -> Result<(), DomainError>;
}

#[async_trait]
pub trait RemoteAllocationManager: RemoteObject {
    /// Allocate against this domain's own devices only
    async fn allocate_local(
        &self,
        requests: Vec<AllocationRequest>,
        requesting_domain: &str,
    ) -> Result<Vec<AllocationResponse>, DomainError>;

    async fn deallocate(&self, allocation_ids: &[String]) -> Result<(), DomainError>;

    async fn local_allocations(&self, allocation_ids: &[String])
    -> Result<Vec<AllocationStatus>, DomainError>;

    async fn local_devices(&self) -> Result<Vec<DeviceLocation>, DomainError>;
}
