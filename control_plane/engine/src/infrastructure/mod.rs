//! Infrastructure Layer
//!
//! Adapters implementing the ports defined in the domain layer.
//!
//! ## Adapters
//!
//! - `TokioProcessLauncher`: real child processes for device and service placements
//! - `InMemoryStore` / `JsonFileStore`: persistence stores for domain state
//! - `YamlProfileRepository`: SPD/PRF/DCD/SAD descriptors read from an SDR root
//! - `InMemoryNamingService`: hierarchical name tree
//! - `LocalObjectBroker`: reference resolution for in-process objects
//! - `local_objects`: in-process devices, components, ports and event channels
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sdr_engine::infrastructure::{InMemoryStore, TokioProcessLauncher, YamlProfileRepository};
//! use std::sync::Arc;
//!
//! let launcher = Arc::new(TokioProcessLauncher::new());
//! let store = Arc::new(InMemoryStore::new());
//! let profiles = Arc::new(YamlProfileRepository::new("/var/sdr"));
//! ```

pub mod in_memory_store;
pub mod json_file_store;
pub mod local_broker;
pub mod local_objects;
pub mod naming;
pub mod tokio_launcher;
pub mod yaml_profiles;

pub use in_memory_store::InMemoryStore;
pub use json_file_store::JsonFileStore;
pub use local_broker::LocalObjectBroker;
pub use local_objects::{
    LocalComponent, LocalDevice, LocalEventChannel, LocalEventChannelFactory, LocalProvidesPort,
    LocalUsesPort,
};
pub use naming::InMemoryNamingService;
pub use tokio_launcher::TokioProcessLauncher;
pub use yaml_profiles::YamlProfileRepository;
