//! Domain registry entries
//! What the DomainManager tracks for each registered device manager, device,
//! service, remote domain, event channel and application factory, along with
//! the records they persist as.

use crate::domain::entities::profiles::{DeviceConfiguration, Properties};
use crate::domain::ports::{Device, DeviceManagerRef, DomainManagerRef, ObjectBroker, ObjectRef};
use crate::domain::value_objects::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeviceManagerNode {
    pub identifier: String,
    pub label: String,
    pub device_manager: Arc<dyn DeviceManagerRef>,
    /// Parsed node descriptor, when it could be loaded
    pub configuration: Option<DeviceConfiguration>,
}

impl DeviceManagerNode {
    pub fn to_record(&self) -> DeviceManagerRecord {
        DeviceManagerRecord {
            identifier: self.identifier.clone(),
            label: self.label.clone(),
            ior: self.device_manager.ior(),
        }
    }
}

impl fmt::Debug for DeviceManagerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManagerNode")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceManagerRecord {
    pub identifier: String,
    pub label: String,
    pub ior: String,
}

#[derive(Clone)]
pub struct DeviceNode {
    pub identifier: String,
    pub label: String,
    pub software_profile: String,
    pub implementation_id: String,
    /// Merged PRF of the device's package and implementation
    pub properties: Properties,
    /// Properties a deployment must present to use this device
    pub requires: Vec<DataType>,
    pub device_manager_id: String,
    pub device_manager: Arc<dyn DeviceManagerRef>,
    pub device: Arc<dyn Device>,
    pub is_loadable: bool,
    pub is_executable: bool,
}

impl DeviceNode {
    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            identifier: self.identifier.clone(),
            label: self.label.clone(),
            software_profile: self.software_profile.clone(),
            implementation_id: self.implementation_id.clone(),
            properties: self.properties.clone(),
            requires: self.requires.clone(),
            device_manager_id: self.device_manager_id.clone(),
            device_manager_ior: self.device_manager.ior(),
            ior: self.device.ior(),
            is_loadable: self.is_loadable,
            is_executable: self.is_executable,
        }
    }

    pub fn from_record(record: &DeviceRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        Some(Self {
            identifier: record.identifier.clone(),
            label: record.label.clone(),
            software_profile: record.software_profile.clone(),
            implementation_id: record.implementation_id.clone(),
            properties: record.properties.clone(),
            requires: record.requires.clone(),
            device_manager_id: record.device_manager_id.clone(),
            device_manager: broker.device_manager(&record.device_manager_ior)?,
            device: broker.device(&record.ior)?,
            is_loadable: record.is_loadable,
            is_executable: record.is_executable,
        })
    }
}

impl fmt::Debug for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceNode")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .field("device_manager_id", &self.device_manager_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub identifier: String,
    pub label: String,
    pub software_profile: String,
    #[serde(default)]
    pub implementation_id: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub requires: Vec<DataType>,
    pub device_manager_id: String,
    pub device_manager_ior: String,
    pub ior: String,
    #[serde(default)]
    pub is_loadable: bool,
    #[serde(default)]
    pub is_executable: bool,
}

#[derive(Clone)]
pub struct ServiceNode {
    pub name: String,
    pub service_id: String,
    pub device_manager_id: String,
    pub service: ObjectRef,
}

impl ServiceNode {
    pub fn to_record(&self) -> ServiceRecord {
        ServiceRecord {
            name: self.name.clone(),
            service_id: self.service_id.clone(),
            device_manager_id: self.device_manager_id.clone(),
            ior: self.service.ior(),
        }
    }

    pub fn from_record(record: &ServiceRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        Some(Self {
            name: record.name.clone(),
            service_id: record.service_id.clone(),
            device_manager_id: record.device_manager_id.clone(),
            service: broker.object(&record.ior)?,
        })
    }
}

impl fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNode")
            .field("name", &self.name)
            .field("device_manager_id", &self.device_manager_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub service_id: String,
    pub device_manager_id: String,
    pub ior: String,
}

/// A peer domain this domain federates allocations to
#[derive(Clone)]
pub struct DomainManagerNode {
    pub identifier: String,
    pub name: String,
    pub domain_manager: Arc<dyn DomainManagerRef>,
}

impl DomainManagerNode {
    pub fn to_record(&self) -> DomainManagerRecord {
        DomainManagerRecord {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            ior: self.domain_manager.ior(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainManagerRecord {
    pub identifier: String,
    pub name: String,
    pub ior: String,
}

#[derive(Clone)]
pub struct EventChannelNode {
    pub name: String,
    pub bound_name: String,
    pub connection_count: u32,
    pub channel: ObjectRef,
}

impl EventChannelNode {
    pub fn to_record(&self) -> EventChannelRecord {
        EventChannelRecord {
            name: self.name.clone(),
            bound_name: self.bound_name.clone(),
            connection_count: self.connection_count,
            ior: self.channel.ior(),
        }
    }

    pub fn from_record(record: &EventChannelRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        Some(Self {
            name: record.name.clone(),
            bound_name: record.bound_name.clone(),
            connection_count: record.connection_count,
            channel: broker.object(&record.ior)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChannelRecord {
    pub name: String,
    pub bound_name: String,
    pub connection_count: u32,
    pub ior: String,
}

/// An installed application profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppFactoryNode {
    pub identifier: String,
    pub name: String,
    pub profile: String,
}
