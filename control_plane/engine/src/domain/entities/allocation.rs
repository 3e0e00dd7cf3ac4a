//! Allocation requests, grants and the allocation table entries

use crate::domain::entities::profiles::OsDependency;
use crate::domain::ports::{Device, DeviceManagerRef, ObjectBroker, RemoteAllocationManager};
use crate::domain::value_objects::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One request for capacity
#[derive(Clone, Default)]
pub struct AllocationRequest {
    pub request_id: String,
    pub source_id: String,
    pub properties: Vec<DataType>,
    /// Devices the request may be satisfied by. Empty means any device.
    /// A `None` entry is a nil reference and disqualifies the request.
    pub requested_devices: Vec<Option<Arc<dyn Device>>>,
    /// Properties matched against a device's own requirements
    pub device_requires: Vec<DataType>,
    pub processor_deps: Vec<String>,
    pub os_deps: Vec<OsDependency>,
}

impl AllocationRequest {
    pub fn new(request_id: impl Into<String>, properties: Vec<DataType>) -> Self {
        Self {
            request_id: request_id.into(),
            properties,
            ..Default::default()
        }
    }
}

impl fmt::Debug for AllocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationRequest")
            .field("request_id", &self.request_id)
            .field("properties", &self.properties)
            .field("requested_devices", &self.requested_devices.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct AllocationResponse {
    pub request_id: String,
    pub allocation_id: String,
    pub properties: Vec<DataType>,
    pub device: Arc<dyn Device>,
    pub device_manager: Arc<dyn DeviceManagerRef>,
}

impl fmt::Debug for AllocationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationResponse")
            .field("request_id", &self.request_id)
            .field("allocation_id", &self.allocation_id)
            .field("device", &self.device.ior())
            .finish()
    }
}

#[derive(Clone)]
pub struct AllocationStatus {
    pub allocation_id: String,
    pub requesting_domain: String,
    pub properties: Vec<DataType>,
    pub device: Arc<dyn Device>,
    pub device_manager: Arc<dyn DeviceManagerRef>,
}

impl fmt::Debug for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationStatus")
            .field("allocation_id", &self.allocation_id)
            .field("requesting_domain", &self.requesting_domain)
            .finish()
    }
}

/// Where a device lives
#[derive(Clone)]
pub struct DeviceLocation {
    pub domain_name: String,
    pub device_manager: Arc<dyn DeviceManagerRef>,
    pub device: Arc<dyn Device>,
}

impl fmt::Debug for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLocation")
            .field("domain_name", &self.domain_name)
            .field("device", &self.device.ior())
            .finish()
    }
}

/// Grant held against a device of this domain
#[derive(Clone)]
pub struct LocalAllocation {
    pub allocation_id: String,
    pub requesting_domain: String,
    pub source_id: String,
    pub properties: Vec<DataType>,
    pub device: Arc<dyn Device>,
    pub device_manager: Arc<dyn DeviceManagerRef>,
}

impl LocalAllocation {
    pub fn status(&self) -> AllocationStatus {
        AllocationStatus {
            allocation_id: self.allocation_id.clone(),
            requesting_domain: self.requesting_domain.clone(),
            properties: self.properties.clone(),
            device: self.device.clone(),
            device_manager: self.device_manager.clone(),
        }
    }

    pub fn to_record(&self) -> AllocationRecord {
        AllocationRecord {
            allocation_id: self.allocation_id.clone(),
            requesting_domain: self.requesting_domain.clone(),
            source_id: self.source_id.clone(),
            properties: self.properties.clone(),
            device_ior: self.device.ior(),
            device_manager_ior: self.device_manager.ior(),
            allocation_manager_ior: None,
        }
    }

    pub fn from_record(record: &AllocationRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        Some(Self {
            allocation_id: record.allocation_id.clone(),
            requesting_domain: record.requesting_domain.clone(),
            source_id: record.source_id.clone(),
            properties: record.properties.clone(),
            device: broker.device(&record.device_ior)?,
            device_manager: broker.device_manager(&record.device_manager_ior)?,
        })
    }
}

/// Grant obtained from a peer domain, deallocated through that domain
#[derive(Clone)]
pub struct RemoteAllocation {
    pub allocation: LocalAllocation,
    pub allocation_manager: Arc<dyn RemoteAllocationManager>,
}

impl RemoteAllocation {
    pub fn to_record(&self) -> AllocationRecord {
        AllocationRecord {
            allocation_manager_ior: Some(self.allocation_manager.ior()),
            ..self.allocation.to_record()
        }
    }

    pub fn from_record(record: &AllocationRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        let manager = broker.allocation_manager(record.allocation_manager_ior.as_deref()?)?;
        Some(Self {
            allocation: LocalAllocation::from_record(record, broker)?,
            allocation_manager: manager,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub allocation_id: String,
    pub requesting_domain: String,
    #[serde(default)]
    pub source_id: String,
    pub properties: Vec<DataType>,
    pub device_ior: String,
    pub device_manager_ior: String,
    #[serde(default)]
    pub allocation_manager_ior: Option<String>,
}
