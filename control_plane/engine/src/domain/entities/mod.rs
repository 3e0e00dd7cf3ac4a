pub mod allocation;
pub mod application;
pub mod connection_descriptor;
pub mod connection_node;
pub mod endpoint;
pub mod profiles;
pub mod registration;

pub use allocation::{
    AllocationRecord, AllocationRequest, AllocationResponse, AllocationStatus, DeviceLocation,
    LocalAllocation, RemoteAllocation,
};
pub use application::{ApplicationNode, ApplicationRecord, ComponentNode, UsesDeviceAssignment};
pub use connection_descriptor::{
    ConnectionDescriptor, FindBy, PortSupplierRef, ProvidesDescriptor, UsesPortDescriptor,
};
pub use connection_node::{ConnectionNode, ConnectionRecord};
pub use endpoint::{Endpoint, EndpointRecord, EndpointTarget};
pub use profiles::{
    AccessMode, Code, ComponentInstantiation, ComponentPlacement, ComponentType,
    DeviceConfiguration, Implementation, OsDependency, Properties, PropertyDef, PropertyKind,
    PropertyShape, SoftPkg, SoftwareAssembly,
};
pub use registration::{
    AppFactoryNode, DeviceManagerNode, DeviceManagerRecord, DeviceNode, DeviceRecord,
    DomainManagerNode, DomainManagerRecord, EventChannelNode, EventChannelRecord, ServiceNode,
    ServiceRecord,
};
