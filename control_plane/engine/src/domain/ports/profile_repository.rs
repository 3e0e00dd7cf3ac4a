//! Profile repository port
//! Parsing of SPD/PRF/DCD/SAD descriptors lives behind this interface.

use crate::domain::entities::{DeviceConfiguration, Properties, SoftPkg, SoftwareAssembly};
use crate::domain::Result;
use std::path::PathBuf;

pub trait ProfileRepository: Send + Sync {
    fn load_soft_pkg(&self, path: &str) -> Result<SoftPkg>;

    fn load_properties(&self, path: &str) -> Result<Properties>;

    fn load_device_configuration(&self, path: &str) -> Result<DeviceConfiguration>;

    fn load_software_assembly(&self, path: &str) -> Result<SoftwareAssembly>;

    /// Resolve a path written inside `profile` into a profile path
    fn relative_to(&self, profile: &str, file: &str) -> String;

    /// Location of a profile path on the local file system
    fn local_path(&self, path: &str) -> PathBuf;
}
