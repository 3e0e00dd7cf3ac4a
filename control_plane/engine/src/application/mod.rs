//! Application Layer
//! Composition of the domain services with their infrastructure adapters.

pub mod registry;

pub use registry::{ControlPlane, ControlPlaneSettings};
