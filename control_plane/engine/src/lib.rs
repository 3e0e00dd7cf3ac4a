//! SDR Control Plane Engine
//!
//! The control-plane core of a software-defined-radio component framework:
//! - Connection resolution between uses and provides ports, deferred until dependencies register
//! - Capacity allocation against a live device inventory, federated across domains
//! - Device/service process supervision for a single host (launch, reap, shutdown)
//! - Domain-wide registries with crash recovery through a key/value store

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::{DomainError, RemoteError, Result};
