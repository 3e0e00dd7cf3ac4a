//! Control Plane Registry
//! Composition root wiring the domain manager, an optional device manager for
//! the local node, and the adapters they share.

use crate::domain::ports::{
    DeviceManagerRef, DomainManagerRef, EventChannelFactory, NamingService, ObjectBroker,
    PersistenceStore, ProcessLauncher, ProfileRepository, RemoteAllocationManager,
};
use crate::domain::services::{
    DeviceManager, DeviceManagerSettings, DomainManager, DomainManagerSettings,
};
use crate::domain::Result;
use crate::infrastructure::{
    InMemoryNamingService, InMemoryStore, JsonFileStore, LocalEventChannelFactory,
    LocalObjectBroker, TokioProcessLauncher, YamlProfileRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ControlPlaneSettings {
    pub domain_name: String,
    /// Directory profile paths are resolved against
    pub sdr_root: PathBuf,
    /// Node deployment descriptor; no device manager is started without one
    pub node_config: Option<String>,
    /// State survives restarts only when set
    pub persistence_file: Option<PathBuf>,
    pub debug_level: u8,
    pub logging_config_uri: Option<String>,
}

impl ControlPlaneSettings {
    pub fn new(domain_name: impl Into<String>, sdr_root: impl Into<PathBuf>) -> Self {
        Self {
            domain_name: domain_name.into(),
            sdr_root: sdr_root.into(),
            node_config: None,
            persistence_file: None,
            debug_level: 3,
            logging_config_uri: None,
        }
    }
}

/// Everything one daemon runs: a domain, optionally a node, and the adapters
/// both reach each other through
pub struct ControlPlane {
    naming: Arc<InMemoryNamingService>,
    broker: Arc<LocalObjectBroker>,
    channels: Arc<LocalEventChannelFactory>,
    profiles: Arc<YamlProfileRepository>,
    domain: Arc<DomainManager>,
    device_manager: Option<Arc<DeviceManager>>,
}

impl ControlPlane {
    pub fn new(settings: ControlPlaneSettings) -> Self {
        Self::with_parts(
            settings,
            LocalObjectBroker::new(),
            Arc::new(TokioProcessLauncher::new()),
        )
    }

    /// Build on an existing broker and launcher. A broker shared with a
    /// previous instance lets a restarted domain find the objects that outlived it.
    pub fn with_parts(
        settings: ControlPlaneSettings,
        broker: Arc<LocalObjectBroker>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let naming = Arc::new(InMemoryNamingService::new());
        let channels = Arc::new(LocalEventChannelFactory::new());
        let profiles = Arc::new(YamlProfileRepository::new(&settings.sdr_root));

        let store: Arc<dyn PersistenceStore> = match &settings.persistence_file {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(InMemoryStore::new()),
        };

        let domain = DomainManager::new(
            DomainManagerSettings::new(&settings.domain_name),
            naming.clone() as Arc<dyn NamingService>,
            Some(channels.clone() as Arc<dyn EventChannelFactory>),
            Some(store),
            profiles.clone() as Arc<dyn ProfileRepository>,
            broker.clone() as Arc<dyn ObjectBroker>,
        );
        let domain_ref: Arc<dyn DomainManagerRef> = domain.clone();
        broker.register_domain_manager(&domain_ref);
        let allocations: Arc<dyn RemoteAllocationManager> = domain.allocation_manager();
        broker.register_allocation_manager(&allocations);

        let device_manager = settings.node_config.as_ref().map(|dcd| {
            let mut node_settings = DeviceManagerSettings::new(dcd);
            node_settings.domain_name = Some(settings.domain_name.clone());
            node_settings.debug_level = settings.debug_level;
            node_settings.logging_config_uri = settings.logging_config_uri.clone();

            let manager = DeviceManager::new(
                node_settings,
                profiles.clone() as Arc<dyn ProfileRepository>,
                naming.clone() as Arc<dyn NamingService>,
                broker.clone() as Arc<dyn ObjectBroker>,
                launcher.clone(),
            );
            let manager_ref: Arc<dyn DeviceManagerRef> = manager.clone();
            broker.register_device_manager(&manager_ref);
            manager
        });

        Self {
            naming,
            broker,
            channels,
            profiles,
            domain,
            device_manager,
        }
    }

    /// Bring the domain up, then the node
    pub async fn start(&self) -> Result<()> {
        self.domain.start().await?;
        if let Some(manager) = &self.device_manager {
            manager.start().await?;
        }
        info!(
            domain = %self.domain.name(),
            node = self.device_manager.is_some(),
            "Control plane started"
        );
        Ok(())
    }

    /// Take the node down first so it unregisters cleanly, then the domain
    pub async fn shutdown(&self) {
        if let Some(manager) = &self.device_manager {
            manager.shutdown().await;
        }
        self.domain.shutdown().await;
        info!(domain = %self.domain.name(), "Control plane shut down");
    }

    pub fn domain(&self) -> Arc<DomainManager> {
        self.domain.clone()
    }

    pub fn device_manager(&self) -> Option<Arc<DeviceManager>> {
        self.device_manager.clone()
    }

    pub fn naming(&self) -> Arc<InMemoryNamingService> {
        self.naming.clone()
    }

    pub fn broker(&self) -> Arc<LocalObjectBroker> {
        self.broker.clone()
    }

    pub fn event_channels(&self) -> Arc<LocalEventChannelFactory> {
        self.channels.clone()
    }

    pub fn profiles(&self) -> Arc<YamlProfileRepository> {
        self.profiles.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RemoteObject;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_binds_domain_and_registers_it_with_broker() {
        let dir = TempDir::new().unwrap();
        let plane = ControlPlane::new(ControlPlaneSettings::new("REDHAWK_DEV", dir.path()));

        plane.start().await.unwrap();

        let bound = plane.naming().resolve("REDHAWK_DEV/REDHAWK_DEV").await.unwrap();
        assert_eq!(bound.ior(), plane.domain().ior());
        assert!(plane.broker().domain_manager(&bound.ior()).is_some());
        assert!(plane.device_manager().is_none());

        plane.shutdown().await;
        assert!(plane.domain().is_shut_down());
    }

    #[tokio::test]
    async fn test_persistence_file_is_written_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("state").join("domain.json");
        let mut settings = ControlPlaneSettings::new("REDHAWK_DEV", dir.path());
        settings.persistence_file = Some(file.clone());
        let plane = ControlPlane::new(settings);

        plane.start().await.unwrap();
        plane.shutdown().await;

        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_missing_node_descriptor_fails_start() {
        let dir = TempDir::new().unwrap();
        let mut settings = ControlPlaneSettings::new("REDHAWK_DEV", dir.path());
        settings.node_config = Some("/nodes/none/DeviceManager.dcd.yaml".to_string());
        let plane = ControlPlane::new(settings);

        assert!(plane.start().await.is_err());
        plane.shutdown().await;
    }
}
