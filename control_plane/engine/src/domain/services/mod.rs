pub mod allocation_manager;
pub mod app_connection_manager;
pub mod child_watching_service;
pub mod connection_resolver;
pub mod device_manager;
pub mod domain_connection_manager;
pub mod domain_manager;
pub mod domain_registry;
pub mod exec_params;
pub mod state_persistence;

pub use allocation_manager::AllocationManager;
pub use app_connection_manager::AppConnectionManager;
pub use child_watching_service::{ChildExitEvent, ChildWatchingService};
pub use device_manager::{DeviceManager, DeviceManagerSettings, PendingProcess};
pub use domain_connection_manager::{ConnectionStatus, DomainConnectionManager};
pub use domain_manager::{DomainManager, DomainManagerSettings};
pub use domain_registry::DomainRegistry;
pub use state_persistence::StatePersistence;
