pub mod connection_manager;
pub mod device;
pub mod device_manager_ref;
pub mod domain_manager_ref;
pub mod event_channel_factory;
pub mod event_publisher;
pub mod lookup;
pub mod naming_service;
pub mod object_broker;
pub mod persistence_store;
pub mod process_launcher;
pub mod profile_repository;
pub mod remote_object;

#[cfg(test)]
pub mod mock_objects;

pub use connection_manager::ConnectionManager;
pub use device::Device;
pub use device_manager_ref::DeviceManagerRef;
pub use domain_manager_ref::{DomainManagerRef, RemoteAllocationManager};
pub use event_channel_factory::EventChannelFactory;
pub use event_publisher::EventPublisher;
pub use lookup::{ComponentLookup, DeviceLookup, DomainLookup};
pub use naming_service::NamingService;
pub use object_broker::ObjectBroker;
pub use persistence_store::PersistenceStore;
pub use process_launcher::{LaunchConfig, LaunchResult, ProcessExitHandle, ProcessLauncher};
pub use profile_repository::ProfileRepository;
pub use remote_object::{object_exists, LifeCycle, ObjectRef, PortSupplier, RemoteObject, UsesPort};

#[cfg(test)]
pub use persistence_store::MockPersistenceStore;
