//! Daemon configuration from environment variables
//!
//! All configuration is read from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;

const DEFAULT_DOMAIN_NAME: &str = "REDHAWK_DEV";
const DEFAULT_SDR_ROOT: &str = "/var/redhawk/sdr";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_DEBUG_LEVEL: u8 = 3;
const MAX_DEBUG_LEVEL: u8 = 5;

/// Daemon configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub domain_name: String,

    /// Root directory of the profile tree
    pub sdr_root: PathBuf,

    /// Node deployment descriptor, relative to the SDR root
    pub node_config: Option<String>,

    /// Domain state file; state is kept in memory only when unset
    pub persistence_file: Option<PathBuf>,

    /// Daemon log filter
    pub log_level: String,

    /// Level handed to launched devices when no logging config URI is set
    pub debug_level: u8,

    pub logging_config_uri: Option<String>,
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            domain_name: non_empty("SDR_DOMAIN_NAME")
                .unwrap_or_else(|| DEFAULT_DOMAIN_NAME.to_string()),
            sdr_root: non_empty("SDR_SDR_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SDR_ROOT)),
            node_config: non_empty("SDR_NODE_CONFIG"),
            persistence_file: non_empty("SDR_PERSISTENCE_FILE").map(PathBuf::from),
            // Priority: SDR_LOG_LEVEL > RUST_LOG > default
            log_level: non_empty("SDR_LOG_LEVEL")
                .or_else(|| non_empty("RUST_LOG"))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            debug_level: non_empty("SDR_DEBUG_LEVEL")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_DEBUG_LEVEL),
            logging_config_uri: non_empty("SDR_LOGGING_CONFIG_URI"),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.domain_name.contains('/') {
            return Err(format!(
                "SDR_DOMAIN_NAME '{}' must not contain '/'",
                self.domain_name
            ));
        }
        if self.debug_level > MAX_DEBUG_LEVEL {
            return Err(format!(
                "SDR_DEBUG_LEVEL must be between 0 and {MAX_DEBUG_LEVEL}, got {}",
                self.debug_level
            ));
        }
        if self.node_config.is_some() && !self.sdr_root.is_dir() {
            return Err(format!(
                "SDR_SDR_ROOT '{}' is not a directory",
                self.sdr_root.display()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> DaemonConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config(&[]);
        assert_eq!(config.domain_name, DEFAULT_DOMAIN_NAME);
        assert_eq!(config.sdr_root, PathBuf::from(DEFAULT_SDR_ROOT));
        assert!(config.node_config.is_none());
        assert!(config.persistence_file.is_none());
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.debug_level, DEFAULT_DEBUG_LEVEL);
    }

    #[test]
    fn test_node_and_persistence() {
        let config = config(&[
            ("SDR_NODE_CONFIG", "/nodes/gpp/DeviceManager.dcd.yaml"),
            ("SDR_PERSISTENCE_FILE", "/var/lib/sdr/domain.json"),
        ]);
        assert_eq!(
            config.node_config.as_deref(),
            Some("/nodes/gpp/DeviceManager.dcd.yaml")
        );
        assert_eq!(
            config.persistence_file,
            Some(PathBuf::from("/var/lib/sdr/domain.json"))
        );
    }

    #[test]
    fn test_log_level_priority() {
        let config1 = config(&[("SDR_LOG_LEVEL", "debug"), ("RUST_LOG", "trace")]);
        assert_eq!(config1.log_level, "debug");

        let config2 = config(&[("RUST_LOG", "trace")]);
        assert_eq!(config2.log_level, "trace");

        let config3 = config(&[("SDR_LOG_LEVEL", "  ")]);
        assert_eq!(config3.log_level, "info");
    }

    #[test]
    fn test_bad_debug_level_falls_back() {
        assert_eq!(config(&[("SDR_DEBUG_LEVEL", "loud")]).debug_level, DEFAULT_DEBUG_LEVEL);
        assert_eq!(config(&[("SDR_DEBUG_LEVEL", "5")]).debug_level, 5);
    }

    #[test]
    fn test_validation() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();

        assert!(config(&[]).validate().is_ok());
        assert!(config(&[("SDR_DOMAIN_NAME", "a/b")]).validate().is_err());
        assert!(config(&[("SDR_DEBUG_LEVEL", "9")]).validate().is_err());
        assert!(
            config(&[("SDR_NODE_CONFIG", "/n.dcd.yaml"), ("SDR_SDR_ROOT", "/nonexistent/sdr")])
                .validate()
                .is_err()
        );
        assert!(
            config(&[("SDR_NODE_CONFIG", "/n.dcd.yaml"), ("SDR_SDR_ROOT", &root)])
                .validate()
                .is_ok()
        );
    }
}
