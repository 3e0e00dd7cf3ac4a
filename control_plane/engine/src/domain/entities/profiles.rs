//! Profile descriptors
//! Parsed forms of the package (SPD), property (PRF), node deployment (DCD)
//! and assembly (SAD) descriptors, as returned by a `ProfileRepository`.

use crate::domain::entities::ConnectionDescriptor;
use crate::domain::value_objects::{Action, DataType, PropertyValue, SimpleType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Allocation,
    Configure,
    Property,
    ExecParam,
    Event,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyShape {
    #[default]
    Simple,
    Sequence,
    Struct,
}

/// One property declared in a PRF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub value_type: SimpleType,
    #[serde(default)]
    pub shape: PropertyShape,
    #[serde(default)]
    pub kinds: Vec<PropertyKind>,
    #[serde(default)]
    pub mode: AccessMode,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub value: PropertyValue,
}

impl PropertyDef {
    pub fn has_kind(&self, kind: PropertyKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_external(&self) -> bool {
        self.action == Action::External
    }

    pub fn is_readonly(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }

    pub fn is_simple(&self) -> bool {
        self.shape == PropertyShape::Simple
    }
}

/// A property file, or the merge of several
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

impl Properties {
    pub fn get(&self, id: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn allocation_property(&self, id: &str) -> Option<&PropertyDef> {
        self.get(id).filter(|p| p.has_kind(PropertyKind::Allocation))
    }

    pub fn configure_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| {
            p.has_kind(PropertyKind::Configure) || p.has_kind(PropertyKind::Property)
        })
    }

    pub fn exec_param_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties
            .iter()
            .filter(|p| p.has_kind(PropertyKind::ExecParam))
    }

    /// Overlay `other` onto this set; definitions in `other` replace same-id ones
    pub fn merge(&mut self, other: &Properties) {
        for def in &other.properties {
            match self.properties.iter_mut().find(|p| p.id == def.id) {
                Some(existing) => *existing = def.clone(),
                None => self.properties.push(def.clone()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    #[default]
    Device,
    LoadableDevice,
    ExecutableDevice,
    Service,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsDependency {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub local_file: String,
    #[serde(default)]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub id: String,
    pub code: Code,
    #[serde(default)]
    pub processors: Vec<String>,
    #[serde(default)]
    pub os: Vec<OsDependency>,
    #[serde(default)]
    pub properties_file: Option<String>,
}

impl Implementation {
    /// Whether this implementation can run on a host with the given processor and OS
    pub fn runs_on(&self, processor: &str, os_name: &str) -> bool {
        let processor_ok =
            self.processors.is_empty() || self.processors.iter().any(|p| p == processor);
        let os_ok = self.os.is_empty() || self.os.iter().any(|o| o.name == os_name);
        processor_ok && os_ok
    }
}

/// Software package descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftPkg {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub component_type: ComponentType,
    #[serde(default)]
    pub properties_file: Option<String>,
    #[serde(default)]
    pub implementations: Vec<Implementation>,
}

impl SoftPkg {
    pub fn implementation(&self, id: &str) -> Option<&Implementation> {
        self.implementations.iter().find(|i| i.id == id)
    }

    pub fn is_service(&self) -> bool {
        self.component_type == ComponentType::Service
    }

    pub fn is_loadable(&self) -> bool {
        matches!(
            self.component_type,
            ComponentType::LoadableDevice | ComponentType::ExecutableDevice
        )
    }

    pub fn is_executable(&self) -> bool {
        self.component_type == ComponentType::ExecutableDevice
    }
}

/// One instance of a placed component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstantiation {
    pub id: String,
    pub usage_name: String,
    #[serde(default)]
    pub overrides: Vec<DataType>,
    #[serde(default)]
    pub device_requires: Vec<DataType>,
    #[serde(default)]
    pub logging_config: Option<String>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl ComponentInstantiation {
    pub fn override_for(&self, id: &str) -> Option<&PropertyValue> {
        self.overrides.iter().find(|o| o.id == id).map(|o| &o.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlacement {
    /// Path of the placed component's SPD
    pub file: String,
    /// Instantiation id of the composite parent device, if any
    #[serde(default)]
    pub composite_part_of: Option<String>,
    #[serde(default)]
    pub deploy_on_device: Option<String>,
    #[serde(default)]
    pub instantiations: Vec<ComponentInstantiation>,
}

/// Node deployment descriptor read by a DeviceManager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub logging_config: Option<String>,
    #[serde(default)]
    pub placements: Vec<ComponentPlacement>,
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,
}

impl DeviceConfiguration {
    pub fn instantiation(&self, id: &str) -> Option<(&ComponentPlacement, &ComponentInstantiation)> {
        self.placements.iter().find_map(|placement| {
            placement
                .instantiations
                .iter()
                .find(|inst| inst.id == id)
                .map(|inst| (placement, inst))
        })
    }
}

/// Application assembly descriptor, as much of it as installation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareAssembly {
    pub id: String,
    pub name: String,
}
