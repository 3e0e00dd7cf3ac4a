//! YAML Profile Repository
//! Reads package, property, node and assembly descriptors written as YAML
//! under an SDR root directory. Profile paths are absolute within the root
//! (`/devices/GPP/GPP.spd.yaml` lives at `<root>/devices/GPP/GPP.spd.yaml`).

use crate::domain::entities::{DeviceConfiguration, Properties, SoftPkg, SoftwareAssembly};
use crate::domain::ports::ProfileRepository;
use crate::domain::{DomainError, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct YamlProfileRepository {
    root: PathBuf,
}

impl YamlProfileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let local = self.local_path(path);
        let content = std::fs::read_to_string(&local).map_err(|e| DomainError::InvalidProfile {
            path: path.to_string(),
            reason: format!("failed to read '{}': {e}", local.display()),
        })?;
        let parsed = serde_yaml::from_str(&content).map_err(|e| DomainError::InvalidProfile {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        debug!(profile = %path, "Loaded profile");
        Ok(parsed)
    }
}

impl ProfileRepository for YamlProfileRepository {
    fn load_soft_pkg(&self, path: &str) -> Result<SoftPkg> {
        self.load(path)
    }

    fn load_properties(&self, path: &str) -> Result<Properties> {
        self.load(path)
    }

    fn load_device_configuration(&self, path: &str) -> Result<DeviceConfiguration> {
        self.load(path)
    }

    fn load_software_assembly(&self, path: &str) -> Result<SoftwareAssembly> {
        self.load(path)
    }

    fn relative_to(&self, profile: &str, file: &str) -> String {
        if file.starts_with('/') {
            return file.to_string();
        }
        match profile.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{file}"),
            None => file.to_string(),
        }
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}
