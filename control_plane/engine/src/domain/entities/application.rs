//! Application deployment record
//! Created by the deployer once an application is running. Released as a unit.

use crate::domain::entities::connection_node::{ConnectionNode, ConnectionRecord};
use crate::domain::ports::{ObjectBroker, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsesDeviceAssignment {
    pub uses_id: String,
    pub device_id: String,
}

#[derive(Clone, Default)]
pub struct ComponentNode {
    pub identifier: String,
    pub name: String,
    pub implementation_id: String,
    /// Device the component was loaded and executed on
    pub assigned_device_id: Option<String>,
    pub uses_devices: Vec<UsesDeviceAssignment>,
    pub process_id: Option<u32>,
    pub naming_context: Option<String>,
    pub object: Option<ObjectRef>,
    pub is_assembly_controller: bool,
}

impl ComponentNode {
    fn to_record(&self) -> ComponentRecord {
        ComponentRecord {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            implementation_id: self.implementation_id.clone(),
            assigned_device_id: self.assigned_device_id.clone(),
            uses_devices: self.uses_devices.clone(),
            process_id: self.process_id,
            naming_context: self.naming_context.clone(),
            ior: self.object.as_ref().map(|o| o.ior()),
            is_assembly_controller: self.is_assembly_controller,
        }
    }

    fn from_record(record: &ComponentRecord, broker: &dyn ObjectBroker) -> Self {
        Self {
            identifier: record.identifier.clone(),
            name: record.name.clone(),
            implementation_id: record.implementation_id.clone(),
            assigned_device_id: record.assigned_device_id.clone(),
            uses_devices: record.uses_devices.clone(),
            process_id: record.process_id,
            naming_context: record.naming_context.clone(),
            object: record.ior.as_deref().and_then(|ior| broker.object(ior)),
            is_assembly_controller: record.is_assembly_controller,
        }
    }
}

#[derive(Clone, Default)]
pub struct ApplicationNode {
    pub identifier: String,
    pub name: String,
    pub profile: String,
    pub context_name: String,
    pub object: Option<ObjectRef>,
    pub components: Vec<ComponentNode>,
    /// Devices the application as a whole uses, by uses-device id
    pub uses_devices: Vec<UsesDeviceAssignment>,
    pub connections: Vec<ConnectionNode>,
    pub allocation_ids: Vec<String>,
    pub file_table: Vec<String>,
    pub external_ports: HashMap<String, String>,
    pub external_properties: HashMap<String, String>,
}

impl ApplicationNode {
    pub fn assembly_controller(&self) -> Option<&ComponentNode> {
        self.components.iter().find(|c| c.is_assembly_controller)
    }

    pub fn component(&self, identifier: &str) -> Option<&ComponentNode> {
        self.components.iter().find(|c| c.identifier == identifier)
    }

    /// Whether any component runs on, or any uses-device assignment names, the device
    pub fn depends_on_device(&self, device_id: &str) -> bool {
        self.components.iter().any(|c| {
            c.assigned_device_id.as_deref() == Some(device_id)
                || c.uses_devices.iter().any(|u| u.device_id == device_id)
        }) || self.uses_devices.iter().any(|u| u.device_id == device_id)
    }

    pub fn process_ids(&self) -> Vec<u32> {
        self.components.iter().filter_map(|c| c.process_id).collect()
    }

    pub fn to_record(&self) -> ApplicationRecord {
        ApplicationRecord {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            profile: self.profile.clone(),
            context_name: self.context_name.clone(),
            ior: self.object.as_ref().map(|o| o.ior()),
            components: self.components.iter().map(ComponentNode::to_record).collect(),
            uses_devices: self.uses_devices.clone(),
            connections: self.connections.iter().map(ConnectionNode::to_record).collect(),
            allocation_ids: self.allocation_ids.clone(),
            file_table: self.file_table.clone(),
            external_ports: self.external_ports.clone(),
            external_properties: self.external_properties.clone(),
        }
    }

    pub fn from_record(record: &ApplicationRecord, broker: &dyn ObjectBroker) -> Self {
        Self {
            identifier: record.identifier.clone(),
            name: record.name.clone(),
            profile: record.profile.clone(),
            context_name: record.context_name.clone(),
            object: record.ior.as_deref().and_then(|ior| broker.object(ior)),
            components: record
                .components
                .iter()
                .map(|c| ComponentNode::from_record(c, broker))
                .collect(),
            uses_devices: record.uses_devices.clone(),
            connections: record
                .connections
                .iter()
                .filter_map(|c| ConnectionNode::from_record(c, broker))
                .collect(),
            allocation_ids: record.allocation_ids.clone(),
            file_table: record.file_table.clone(),
            external_ports: record.external_ports.clone(),
            external_properties: record.external_properties.clone(),
        }
    }
}

impl fmt::Debug for ApplicationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationNode")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("components", &self.components.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub identifier: String,
    pub name: String,
    pub implementation_id: String,
    pub assigned_device_id: Option<String>,
    #[serde(default)]
    pub uses_devices: Vec<UsesDeviceAssignment>,
    pub process_id: Option<u32>,
    pub naming_context: Option<String>,
    pub ior: Option<String>,
    #[serde(default)]
    pub is_assembly_controller: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub identifier: String,
    pub name: String,
    pub profile: String,
    pub context_name: String,
    pub ior: Option<String>,
    pub components: Vec<ComponentRecord>,
    #[serde(default)]
    pub uses_devices: Vec<UsesDeviceAssignment>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default)]
    pub allocation_ids: Vec<String>,
    #[serde(default)]
    pub file_table: Vec<String>,
    #[serde(default)]
    pub external_ports: HashMap<String, String>,
    #[serde(default)]
    pub external_properties: HashMap<String, String>,
}
