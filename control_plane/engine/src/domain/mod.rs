pub mod constants;
pub mod entities;
pub mod error;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use entities::{
    AllocationRequest, AllocationResponse, AllocationStatus, ApplicationNode, ComponentNode,
    ConnectionDescriptor, ConnectionNode, DeviceConfiguration, DeviceLocation, DeviceManagerNode,
    DeviceNode, Endpoint, Properties, PropertyDef, ServiceNode, SoftPkg,
};
pub use error::{DomainError, NamingError, PersistenceError, RemoteError, Result};
pub use ports::ConnectionManager;
pub use services::{
    AllocationManager, AppConnectionManager, ConnectionStatus, DeviceManager,
    DeviceManagerSettings, DomainConnectionManager, DomainManager, DomainManagerSettings,
};
pub use value_objects::{
    AdminState, ChildExitStatus, DataType, DependencyType, DomainEvent, PropertyValue, SimpleType,
    SourceCategory, UsageState,
};
