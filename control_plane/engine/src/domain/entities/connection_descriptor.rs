//! Connection descriptors as declared in deployment profiles

use serde::{Deserialize, Serialize};

/// Where a named object is looked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindBy {
    NamingService(String),
    DomainFinder {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        name: String,
    },
}

/// The object that supplies a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSupplierRef {
    ComponentInstantiationRef(String),
    FindBy(FindBy),
    DeviceThatLoaded(String),
    DeviceUsedBy {
        refid: String,
        usesrefid: String,
    },
    ApplicationUsesDevice(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsesPortDescriptor {
    pub port_name: String,
    pub supplier: PortSupplierRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvidesDescriptor {
    Port {
        port_name: String,
        supplier: PortSupplierRef,
    },
    ComponentSupportedInterface {
        #[serde(default)]
        interface: Option<String>,
        supplier: PortSupplierRef,
    },
    FindBy(FindBy),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Empty when the profile did not name the connection
    #[serde(default)]
    pub id: String,
    pub uses: UsesPortDescriptor,
    pub provides: ProvidesDescriptor,
}
