//! Domain registry
//! The collections a DomainManager owns: device managers, devices, services,
//! applications, application factories, remote domains and event channels.
//! Readers get point-in-time snapshots so no lock is held across a remote call.

use crate::domain::constants::{
    DEFAULT_EVENT_CHANNEL, FINDER_APPLICATION, FINDER_DOMAIN_MANAGER, FINDER_EVENT_CHANNEL,
    FINDER_SERVICE_NAME, FINDER_SERVICE_TYPE,
};
use crate::domain::entities::{
    AppFactoryNode, ApplicationNode, DeviceManagerNode, DeviceNode, DomainManagerNode,
    EventChannelNode, ServiceNode,
};
use crate::domain::ports::{
    ComponentLookup, DomainLookup, EventChannelFactory, NamingService, ObjectRef,
};
use crate::domain::{DomainError, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct RegistryState {
    device_managers: Vec<DeviceManagerNode>,
    devices: Vec<DeviceNode>,
    services: Vec<ServiceNode>,
    applications: Vec<ApplicationNode>,
    app_factories: Vec<AppFactoryNode>,
    domain_managers: Vec<DomainManagerNode>,
    event_channels: Vec<EventChannelNode>,
    /// Channels the domain itself publishes on; never pruned
    pinned_channels: HashSet<String>,
}

pub struct DomainRegistry {
    domain_name: String,
    naming: Arc<dyn NamingService>,
    channel_factory: Option<Arc<dyn EventChannelFactory>>,
    domain_object: OnceCell<ObjectRef>,
    state: RwLock<RegistryState>,
}

impl DomainRegistry {
    pub fn new(
        domain_name: impl Into<String>,
        naming: Arc<dyn NamingService>,
        channel_factory: Option<Arc<dyn EventChannelFactory>>,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            naming,
            channel_factory,
            domain_object: OnceCell::new(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn naming(&self) -> &Arc<dyn NamingService> {
        &self.naming
    }

    /// The object `domainmanager` lookups answer with. Set once.
    pub fn set_domain_object(&self, object: ObjectRef) {
        if self.domain_object.set(object).is_err() {
            debug!("Domain object already set");
        }
    }

    // Device managers

    pub async fn device_managers(&self) -> Vec<DeviceManagerNode> {
        self.state.read().await.device_managers.clone()
    }

    pub async fn device_manager(&self, identifier: &str) -> Option<DeviceManagerNode> {
        self.state
            .read()
            .await
            .device_managers
            .iter()
            .find(|d| d.identifier == identifier)
            .cloned()
    }

    pub async fn device_manager_by_ior(&self, ior: &str) -> Option<DeviceManagerNode> {
        self.state
            .read()
            .await
            .device_managers
            .iter()
            .find(|d| d.device_manager.ior() == ior)
            .cloned()
    }

    /// Insert, replacing any node with the same identifier
    pub async fn put_device_manager(&self, node: DeviceManagerNode) {
        let mut state = self.state.write().await;
        state
            .device_managers
            .retain(|d| d.identifier != node.identifier);
        state.device_managers.push(node);
    }

    pub async fn remove_device_manager(&self, identifier: &str) -> Option<DeviceManagerNode> {
        let mut state = self.state.write().await;
        let index = state
            .device_managers
            .iter()
            .position(|d| d.identifier == identifier)?;
        Some(state.device_managers.remove(index))
    }

    // Devices

    pub async fn devices(&self) -> Vec<DeviceNode> {
        self.state.read().await.devices.clone()
    }

    pub async fn device(&self, identifier: &str) -> Option<DeviceNode> {
        self.state
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.identifier == identifier)
            .cloned()
    }

    pub async fn device_by_ior(&self, ior: &str) -> Option<DeviceNode> {
        self.state
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.device.ior() == ior)
            .cloned()
    }

    pub async fn put_device(&self, node: DeviceNode) {
        let mut state = self.state.write().await;
        state.devices.retain(|d| d.identifier != node.identifier);
        state.devices.push(node);
    }

    pub async fn remove_device(&self, identifier: &str) -> Option<DeviceNode> {
        let mut state = self.state.write().await;
        let index = state.devices.iter().position(|d| d.identifier == identifier)?;
        Some(state.devices.remove(index))
    }

    pub async fn remove_devices_of(&self, device_manager_id: &str) -> Vec<DeviceNode> {
        let mut state = self.state.write().await;
        let (removed, kept) = std::mem::take(&mut state.devices)
            .into_iter()
            .partition(|d| d.device_manager_id == device_manager_id);
        state.devices = kept;
        removed
    }

    // Services

    pub async fn services(&self) -> Vec<ServiceNode> {
        self.state.read().await.services.clone()
    }

    pub async fn service(&self, name: &str) -> Option<ServiceNode> {
        self.state
            .read()
            .await
            .services
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    /// `false` when a service with this name is already registered
    pub async fn add_service(&self, node: ServiceNode) -> bool {
        let mut state = self.state.write().await;
        if state.services.iter().any(|s| s.name == node.name) {
            return false;
        }
        state.services.push(node);
        true
    }

    pub async fn remove_service(&self, name: &str) -> Option<ServiceNode> {
        let mut state = self.state.write().await;
        let index = state.services.iter().position(|s| s.name == name)?;
        Some(state.services.remove(index))
    }

    pub async fn remove_services_of(&self, device_manager_id: &str) -> Vec<ServiceNode> {
        let mut state = self.state.write().await;
        let (removed, kept) = std::mem::take(&mut state.services)
            .into_iter()
            .partition(|s| s.device_manager_id == device_manager_id);
        state.services = kept;
        removed
    }

    // Applications and factories

    pub async fn applications(&self) -> Vec<ApplicationNode> {
        self.state.read().await.applications.clone()
    }

    pub async fn application(&self, identifier: &str) -> Option<ApplicationNode> {
        self.state
            .read()
            .await
            .applications
            .iter()
            .find(|a| a.identifier == identifier)
            .cloned()
    }

    pub async fn put_application(&self, node: ApplicationNode) {
        let mut state = self.state.write().await;
        state.applications.retain(|a| a.identifier != node.identifier);
        state.applications.push(node);
    }

    pub async fn remove_application(&self, identifier: &str) -> Option<ApplicationNode> {
        let mut state = self.state.write().await;
        let index = state
            .applications
            .iter()
            .position(|a| a.identifier == identifier)?;
        Some(state.applications.remove(index))
    }

    pub async fn app_factories(&self) -> Vec<AppFactoryNode> {
        self.state.read().await.app_factories.clone()
    }

    /// `false` when a factory with this identifier is already installed
    pub async fn add_app_factory(&self, node: AppFactoryNode) -> bool {
        let mut state = self.state.write().await;
        if state.app_factories.iter().any(|f| f.identifier == node.identifier) {
            return false;
        }
        state.app_factories.push(node);
        true
    }

    pub async fn remove_app_factory(&self, identifier: &str) -> Option<AppFactoryNode> {
        let mut state = self.state.write().await;
        let index = state
            .app_factories
            .iter()
            .position(|f| f.identifier == identifier)?;
        Some(state.app_factories.remove(index))
    }

    // Remote domains

    pub async fn remote_domains(&self) -> Vec<DomainManagerNode> {
        self.state.read().await.domain_managers.clone()
    }

    /// `false` when a domain with this identifier is already registered
    pub async fn add_remote_domain(&self, node: DomainManagerNode) -> bool {
        let mut state = self.state.write().await;
        if state
            .domain_managers
            .iter()
            .any(|d| d.identifier == node.identifier)
        {
            return false;
        }
        state.domain_managers.push(node);
        true
    }

    pub async fn remove_remote_domain(&self, identifier: &str) -> Option<DomainManagerNode> {
        let mut state = self.state.write().await;
        let index = state
            .domain_managers
            .iter()
            .position(|d| d.identifier == identifier)?;
        Some(state.domain_managers.remove(index))
    }

    // Event channels

    pub async fn event_channels(&self) -> Vec<EventChannelNode> {
        self.state.read().await.event_channels.clone()
    }

    pub async fn put_event_channel(&self, node: EventChannelNode) {
        let mut state = self.state.write().await;
        state.event_channels.retain(|c| c.name != node.name);
        state.event_channels.push(node);
    }

    /// Find a channel, creating and binding it on first use
    pub async fn event_channel(&self, name: &str) -> Result<Option<ObjectRef>> {
        let name = if name.is_empty() {
            DEFAULT_EVENT_CHANNEL
        } else {
            name
        };
        if let Some(channel) = self
            .state
            .read()
            .await
            .event_channels
            .iter()
            .find(|c| c.name == name)
        {
            return Ok(Some(channel.channel.clone()));
        }

        let Some(factory) = &self.channel_factory else {
            return Ok(None);
        };
        let channel = factory.create_channel(name).await?;
        let bound_name = format!("{}/{}", self.domain_name, name);
        if let Err(e) = self.naming.rebind(&bound_name, channel.clone()).await {
            warn!(channel = %name, error = %e, "Unable to bind event channel");
        }
        info!(channel = %name, "Created event channel");

        let mut state = self.state.write().await;
        if let Some(existing) = state.event_channels.iter().find(|c| c.name == name) {
            return Ok(Some(existing.channel.clone()));
        }
        state.event_channels.push(EventChannelNode {
            name: name.to_string(),
            bound_name,
            connection_count: 0,
            channel: channel.clone(),
        });
        Ok(Some(channel))
    }

    pub async fn pin_event_channel(&self, name: &str) {
        self.state
            .write()
            .await
            .pinned_channels
            .insert(name.to_string());
    }

    pub async fn unpin_event_channel(&self, name: &str) {
        self.state.write().await.pinned_channels.remove(name);
    }

    /// Destroy every unpinned channel no connection refers to any more
    pub async fn prune_event_channels(&self) -> Vec<String> {
        let unused: Vec<EventChannelNode> = {
            let mut state = self.state.write().await;
            let pinned = std::mem::take(&mut state.pinned_channels);
            let (unused, used) = std::mem::take(&mut state.event_channels)
                .into_iter()
                .partition(|c| c.connection_count == 0 && !pinned.contains(&c.name));
            state.pinned_channels = pinned;
            state.event_channels = used;
            unused
        };
        let mut names = Vec::new();
        for channel in unused {
            if let Err(e) = self.naming.unbind(&channel.bound_name).await {
                debug!(channel = %channel.name, error = %e, "Event channel was not bound");
            }
            if let Some(factory) = &self.channel_factory {
                if let Err(e) = factory.destroy_channel(&channel.name).await {
                    warn!(channel = %channel.name, error = %e, "Unable to destroy event channel");
                }
            }
            names.push(channel.name);
        }
        names
    }

    async fn adjust_channel_count(&self, name: &str, increment: bool) -> u32 {
        let name = if name.is_empty() {
            DEFAULT_EVENT_CHANNEL
        } else {
            name
        };
        let mut state = self.state.write().await;
        match state.event_channels.iter_mut().find(|c| c.name == name) {
            Some(channel) => {
                channel.connection_count = if increment {
                    channel.connection_count + 1
                } else {
                    channel.connection_count.saturating_sub(1)
                };
                channel.connection_count
            }
            None => 0,
        }
    }
}

#[async_trait]
impl DomainLookup for DomainRegistry {
    async fn lookup_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        match kind {
            FINDER_SERVICE_NAME => Ok(self.service(name).await.map(|s| s.service)),
            // Services are not typed by interface here
            FINDER_SERVICE_TYPE => Ok(None),
            FINDER_EVENT_CHANNEL => {
                let channel = self.event_channel(name).await?;
                if channel.is_some() {
                    self.increment_event_channel_connections(name).await;
                }
                Ok(channel)
            }
            FINDER_DOMAIN_MANAGER => {
                if name.is_empty() || name == self.domain_name {
                    return Ok(self.domain_object.get().cloned());
                }
                Ok(self
                    .remote_domains()
                    .await
                    .into_iter()
                    .find(|d| d.name == name)
                    .map(|d| d.domain_manager as ObjectRef))
            }
            FINDER_APPLICATION => Ok(self
                .application(name)
                .await
                .and_then(|a| a.object)),
            other => Err(DomainError::InvalidObjectType(other.to_string())),
        }
    }

    async fn increment_event_channel_connections(&self, name: &str) -> u32 {
        self.adjust_channel_count(name, true).await
    }

    async fn decrement_event_channel_connections(&self, name: &str) -> u32 {
        self.adjust_channel_count(name, false).await
    }
}

#[async_trait]
impl ComponentLookup for DomainRegistry {
    async fn lookup_component_by_instantiation_id(&self, identifier: &str) -> Option<ObjectRef> {
        let state = self.state.read().await;
        if let Some(device) = state.devices.iter().find(|d| d.identifier == identifier) {
            return Some(device.device.clone());
        }
        if let Some(service) = state.services.iter().find(|s| s.service_id == identifier) {
            return Some(service.service.clone());
        }
        state
            .applications
            .iter()
            .flat_map(|a| a.components.iter())
            .find(|c| c.identifier == identifier)
            .and_then(|c| c.object.clone())
    }

    async fn lookup_device_manager_by_instantiation_id(&self, identifier: &str) -> Option<ObjectRef> {
        self.state
            .read()
            .await
            .device_managers
            .iter()
            .find(|d| d.identifier == identifier)
            .map(|d| d.device_manager.clone() as ObjectRef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Properties;
    use crate::domain::ports::mock_objects::{
        MockComponent, MockDevice, MockDeviceManager, MockNaming,
    };
    use crate::domain::ports::RemoteObject;
    use crate::domain::RemoteError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Channels {
        destroyed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventChannelFactory for Channels {
        async fn create_channel(&self, name: &str) -> std::result::Result<ObjectRef, RemoteError> {
            Ok(MockComponent::new(name))
        }

        async fn destroy_channel(&self, name: &str) -> std::result::Result<(), RemoteError> {
            self.destroyed.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn device_node(id: &str, devmgr: &Arc<MockDeviceManager>) -> DeviceNode {
        DeviceNode {
            identifier: id.to_string(),
            label: format!("{id}_label"),
            software_profile: String::new(),
            implementation_id: "cpp".to_string(),
            properties: Properties::default(),
            requires: Vec::new(),
            device_manager_id: "DCE:node-1".to_string(),
            device_manager: devmgr.clone(),
            device: MockDevice::new(id),
            is_loadable: false,
            is_executable: false,
        }
    }

    #[tokio::test]
    async fn test_event_channel_created_on_lookup_and_counted() {
        let factory = Arc::new(Channels::default());
        let registry = DomainRegistry::new("REDHAWK_DEV", MockNaming::new(), Some(factory.clone()));

        let channel = registry
            .lookup_domain_object(FINDER_EVENT_CHANNEL, "")
            .await
            .unwrap();
        assert!(channel.is_some());

        let channels = registry.event_channels().await;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, DEFAULT_EVENT_CHANNEL);
        assert_eq!(channels[0].connection_count, 1);

        assert_eq!(registry.decrement_event_channel_connections("").await, 0);
        assert_eq!(registry.prune_event_channels().await, vec![DEFAULT_EVENT_CHANNEL.to_string()]);
        assert_eq!(factory.destroyed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_component_lookup_covers_devices_and_device_managers() {
        let registry = DomainRegistry::new("REDHAWK_DEV", MockNaming::new(), None);
        let devmgr = MockDeviceManager::new("DCE:node-1");
        registry.put_device(device_node("DCE:gpp-1", &devmgr)).await;
        registry
            .put_device_manager(DeviceManagerNode {
                identifier: "DCE:node-1".to_string(),
                label: "node".to_string(),
                device_manager: devmgr.clone(),
                configuration: None,
            })
            .await;

        assert!(registry.lookup_component_by_instantiation_id("DCE:gpp-1").await.is_some());
        assert!(registry.lookup_component_by_instantiation_id("DCE:nope").await.is_none());
        let found = registry
            .lookup_device_manager_by_instantiation_id("DCE:node-1")
            .await
            .unwrap();
        assert_eq!(found.ior(), devmgr.ior());

        let removed = registry.remove_devices_of("DCE:node-1").await;
        assert_eq!(removed.len(), 1);
        assert!(registry.devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_object_type_is_rejected() {
        let registry = DomainRegistry::new("REDHAWK_DEV", MockNaming::new(), None);
        assert!(matches!(
            registry.lookup_domain_object("widget", "x").await,
            Err(DomainError::InvalidObjectType(_))
        ));
        assert!(registry
            .lookup_domain_object(FINDER_APPLICATION, "missing")
            .await
            .unwrap()
            .is_none());
    }
}
