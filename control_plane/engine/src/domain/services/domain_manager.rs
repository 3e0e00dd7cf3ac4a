//! DomainManager
//! The domain's single point of registration. Device managers, their devices and
//! services register here; applications are installed and tracked here; every
//! domain-scope connection and allocation is routed through the managers it owns.
//!
//! Registries live in memory and are written through to the persistence store
//! after every change. A restarted domain reloads them with `restore_state`,
//! keeping only the objects that still answer.

use crate::domain::constants::{
    EVENT_PUBLISH_TIMEOUT, KEY_APP_FACTORIES, KEY_APPLICATIONS, KEY_CONNECTIONS, KEY_DEVICES, KEY_DEVICE_MANAGERS,
    KEY_DOMAIN_MANAGERS, KEY_EVENT_CHANNELS, KEY_LOCAL_ALLOCATIONS, KEY_REMOTE_ALLOCATIONS,
    KEY_SERVICES, ODM_CHANNEL,
};
use crate::domain::entities::{
    AllocationRecord, AppFactoryNode, ApplicationNode, ApplicationRecord, ConnectionNode,
    ConnectionRecord, DeviceConfiguration, DeviceManagerNode, DeviceManagerRecord, DeviceNode,
    DeviceRecord, DomainManagerNode, DomainManagerRecord, Endpoint, EventChannelNode,
    EventChannelRecord, Properties, ServiceNode, ServiceRecord,
};
use crate::domain::ports::{
    object_exists, ComponentLookup, Device, DeviceManagerRef, DomainLookup, DomainManagerRef,
    EventChannelFactory, NamingService, ObjectBroker, ObjectRef, PersistenceStore,
    ProfileRepository, RemoteAllocationManager, RemoteObject,
};
use crate::domain::services::allocation_manager::AllocationManager;
use crate::domain::services::domain_connection_manager::{ConnectionStatus, DomainConnectionManager};
use crate::domain::services::domain_registry::DomainRegistry;
use crate::domain::services::state_persistence::StatePersistence;
use crate::domain::value_objects::{DataType, DomainEvent, SourceCategory};
use crate::domain::{DomainError, NamingError, RemoteError, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DomainManagerSettings {
    pub domain_name: String,
    /// Generated when absent
    pub identifier: Option<String>,
}

impl DomainManagerSettings {
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            identifier: None,
        }
    }
}

pub struct DomainManager {
    identifier: String,
    ior: String,
    registry: Arc<DomainRegistry>,
    connections: Arc<DomainConnectionManager>,
    allocations: Arc<AllocationManager>,
    persistence: StatePersistence,
    profiles: Arc<dyn ProfileRepository>,
    broker: Arc<dyn ObjectBroker>,
    /// Outgoing channel for object added/removed events
    odm_channel: OnceCell<ObjectRef>,
    shutting_down: AtomicBool,
    shut_down: AtomicBool,
    this: Weak<DomainManager>,
}

impl DomainManager {
    pub fn new(
        settings: DomainManagerSettings,
        naming: Arc<dyn NamingService>,
        channel_factory: Option<Arc<dyn EventChannelFactory>>,
        store: Option<Arc<dyn PersistenceStore>>,
        profiles: Arc<dyn ProfileRepository>,
        broker: Arc<dyn ObjectBroker>,
    ) -> Arc<Self> {
        let persistence = match store {
            Some(store) => StatePersistence::new(store),
            None => StatePersistence::disabled(),
        };
        let registry = Arc::new(DomainRegistry::new(
            settings.domain_name.clone(),
            naming.clone(),
            channel_factory,
        ));
        let connections = Arc::new(DomainConnectionManager::new(
            registry.clone() as Arc<dyn DomainLookup>,
            registry.clone() as Arc<dyn ComponentLookup>,
            naming,
            settings.domain_name.clone(),
        ));
        let allocations = Arc::new(AllocationManager::new(registry.clone(), persistence.clone()));
        let identifier = settings
            .identifier
            .unwrap_or_else(|| format!("DCE:{}", Uuid::new_v4()));

        Arc::new_cyclic(|this| Self {
            identifier,
            ior: format!("IOR:DomainManager:{}", Uuid::new_v4()),
            registry,
            connections,
            allocations,
            persistence,
            profiles,
            broker,
            odm_channel: OnceCell::new(),
            shutting_down: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        self.registry.domain_name()
    }

    pub fn allocation_manager(&self) -> Arc<AllocationManager> {
        self.allocations.clone()
    }

    pub fn connection_manager(&self) -> Arc<DomainConnectionManager> {
        self.connections.clone()
    }

    /// Open the store, reload persisted state and bind the domain under
    /// `<domain>/<domain>`
    pub async fn start(&self) -> Result<()> {
        let Some(this) = self.this.upgrade() else {
            return Err(DomainError::ShuttingDown);
        };
        let object: ObjectRef = this;
        self.registry.set_domain_object(object.clone());

        self.persistence.open().await;
        self.restore_state().await;

        let name = self.registry.domain_name().to_string();
        match self.registry.naming().bind_new_context(&name).await {
            Ok(()) | Err(NamingError::AlreadyBound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.registry
            .naming()
            .rebind(&format!("{name}/{name}"), object)
            .await?;
        self.open_odm_channel().await;

        info!(
            domain = %name,
            identifier = %self.identifier,
            "Domain manager started"
        );
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    async fn open_odm_channel(&self) {
        match self.registry.event_channel(ODM_CHANNEL).await {
            Ok(Some(channel)) => {
                self.registry.pin_event_channel(ODM_CHANNEL).await;
                let _ = self.odm_channel.set(channel);
                self.persist_event_channels().await;
            }
            Ok(None) => debug!("No event channel factory, domain events are not published"),
            Err(e) => warn!(error = %e, "Unable to create the outgoing domain event channel"),
        }
    }

    /// Publish on the outgoing domain channel. Failures are logged only.
    async fn publish(&self, event: DomainEvent) {
        let Some(publisher) = self.odm_channel.get().and_then(|c| c.as_event_publisher()) else {
            return;
        };
        match tokio::time::timeout(EVENT_PUBLISH_TIMEOUT, publisher.publish(&event)).await {
            Ok(Ok(())) => debug!(
                source_id = %event.source_id(),
                category = %event.category(),
                added = event.is_added(),
                "Published domain event"
            ),
            Ok(Err(e)) => warn!(
                source_id = %event.source_id(),
                error = %e,
                "Unable to publish domain event"
            ),
            Err(_) => warn!(source_id = %event.source_id(), "Timed out publishing domain event"),
        }
    }

    fn added(&self, id: &str, name: &str, category: SourceCategory, ior: Option<String>) -> DomainEvent {
        DomainEvent::added(&self.identifier, id, name, category, ior)
    }

    fn removed(&self, id: &str, name: &str, category: SourceCategory) -> DomainEvent {
        DomainEvent::removed(&self.identifier, id, name, category)
    }

    // Restoration

    /// Reload every registry from the store. Objects that no longer answer are
    /// dropped, and the pruned registries are written back.
    pub async fn restore_state(&self) {
        if !self.persistence.is_enabled() {
            return;
        }
        let broker = self.broker.as_ref();

        if let Some(records) = self
            .persistence
            .load::<Vec<DeviceManagerRecord>>(KEY_DEVICE_MANAGERS)
            .await
        {
            for record in records {
                self.restore_device_manager(&record).await;
            }
        }

        if let Some(records) = self.persistence.load::<Vec<DeviceRecord>>(KEY_DEVICES).await {
            for record in records {
                let Some(node) = DeviceNode::from_record(&record, broker) else {
                    warn!(device_id = %record.identifier, "Unable to resolve persisted device");
                    continue;
                };
                if self.registry.device_manager(&node.device_manager_id).await.is_none() {
                    debug!(device_id = %node.identifier, "Persisted device lost its device manager");
                    continue;
                }
                if node.device.non_existent().await {
                    info!(device_id = %node.identifier, "Persisted device no longer exists");
                    continue;
                }
                self.registry.put_device(node).await;
            }
        }

        if let Some(records) = self.persistence.load::<Vec<ServiceRecord>>(KEY_SERVICES).await {
            for record in records {
                let Some(node) = ServiceNode::from_record(&record, broker) else {
                    warn!(service = %record.name, "Unable to resolve persisted service");
                    continue;
                };
                if !object_exists(&node.service).await {
                    info!(service = %node.name, "Persisted service no longer exists");
                    continue;
                }
                self.registry.add_service(node).await;
            }
        }

        if let Some(records) = self
            .persistence
            .load::<Vec<ConnectionRecord>>(KEY_CONNECTIONS)
            .await
        {
            for record in records {
                match ConnectionNode::from_record(&record, broker) {
                    Some(node) => self.connections.restore_connection(node).await,
                    None => warn!(connection_id = %record.identifier, "Unable to restore connection"),
                }
            }
        }

        if let Some(factories) = self
            .persistence
            .load::<Vec<AppFactoryNode>>(KEY_APP_FACTORIES)
            .await
        {
            for factory in factories {
                self.registry.add_app_factory(factory).await;
            }
        }

        if let Some(records) = self
            .persistence
            .load::<Vec<ApplicationRecord>>(KEY_APPLICATIONS)
            .await
        {
            for record in records {
                let node = ApplicationNode::from_record(&record, broker);
                if let Some(object) = &node.object {
                    if !object_exists(object).await {
                        info!(application_id = %node.identifier, "Persisted application no longer exists");
                        continue;
                    }
                }
                self.registry.put_application(node).await;
            }
        }

        if let Some(records) = self
            .persistence
            .load::<Vec<DomainManagerRecord>>(KEY_DOMAIN_MANAGERS)
            .await
        {
            for record in records {
                let Some(domain_manager) = broker.domain_manager(&record.ior) else {
                    warn!(domain = %record.name, "Unable to resolve persisted remote domain");
                    continue;
                };
                if domain_manager.non_existent().await {
                    info!(domain = %record.name, "Remote domain no longer exists");
                    continue;
                }
                self.registry
                    .add_remote_domain(DomainManagerNode {
                        identifier: record.identifier,
                        name: record.name,
                        domain_manager,
                    })
                    .await;
            }
        }

        if let Some(records) = self
            .persistence
            .load::<Vec<EventChannelRecord>>(KEY_EVENT_CHANNELS)
            .await
        {
            for record in records {
                match EventChannelNode::from_record(&record, broker) {
                    Some(node) => self.registry.put_event_channel(node).await,
                    None => warn!(channel = %record.name, "Unable to restore event channel"),
                }
            }
        }

        if let Some(records) = self
            .persistence
            .load::<Vec<AllocationRecord>>(KEY_LOCAL_ALLOCATIONS)
            .await
        {
            self.allocations.restore_local_allocations(&records, broker).await;
        }
        if let Some(records) = self
            .persistence
            .load::<Vec<AllocationRecord>>(KEY_REMOTE_ALLOCATIONS)
            .await
        {
            self.allocations.restore_remote_allocations(&records, broker).await;
        }

        self.persist_all().await;
        info!(
            device_managers = self.registry.device_managers().await.len(),
            devices = self.registry.devices().await.len(),
            services = self.registry.services().await.len(),
            applications = self.registry.applications().await.len(),
            "Restored domain state"
        );
    }

    async fn restore_device_manager(&self, record: &DeviceManagerRecord) {
        let Some(device_manager) = self.broker.device_manager(&record.ior) else {
            warn!(device_manager_id = %record.identifier, "Unable to resolve persisted device manager");
            return;
        };
        if device_manager.non_existent().await {
            info!(device_manager_id = %record.identifier, "Persisted device manager no longer exists");
            return;
        }
        let configuration = self.load_configuration(device_manager.as_ref()).await;
        self.registry
            .put_device_manager(DeviceManagerNode {
                identifier: record.identifier.clone(),
                label: record.label.clone(),
                device_manager,
                configuration,
            })
            .await;
    }

    // Device managers

    pub async fn register_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        let Some(device_manager) = device_manager else {
            return Err(DomainError::InvalidObjectReference(
                "cannot register a nil device manager".to_string(),
            ));
        };
        self.check_running()?;
        let identifier = device_manager.identifier().await?;
        let label = device_manager.label().await?;

        if let Some(existing) = self.registry.device_manager(&identifier).await {
            if !existing.device_manager.non_existent().await {
                debug!(
                    device_manager_id = %identifier,
                    "Device manager already registered"
                );
                return Ok(());
            }
            warn!(
                device_manager_id = %identifier,
                "Replacing registration of a device manager that no longer exists"
            );
            self.drop_device_manager(&existing).await;
        }

        let configuration = self.load_configuration(device_manager.as_ref()).await;
        let descriptors = configuration
            .as_ref()
            .map(|c| c.connections.clone())
            .unwrap_or_default();
        self.registry
            .put_device_manager(DeviceManagerNode {
                identifier: identifier.clone(),
                label: label.clone(),
                device_manager: device_manager.clone(),
                configuration,
            })
            .await;
        self.persist_device_managers().await;
        info!(device_manager_id = %identifier, label = %label, "Device manager registered");
        self.publish(self.added(
            &identifier,
            &label,
            SourceCategory::DeviceManager,
            Some(device_manager.ior()),
        ))
        .await;

        for descriptor in &descriptors {
            if let Err(e) = self.connections.add_connection(&identifier, descriptor).await {
                warn!(
                    device_manager_id = %identifier,
                    connection_id = %descriptor.id,
                    error = %e,
                    "Unable to add node connection"
                );
            }
        }
        self.persist_connections().await;

        // Devices that registered with the node before it reached the domain
        match device_manager.registered_devices().await {
            Ok(devices) => {
                for device in devices {
                    if let Err(e) = self
                        .register_device(Some(device), Some(device_manager.clone()))
                        .await
                    {
                        warn!(device_manager_id = %identifier, error = %e, "Unable to register node device");
                    }
                }
            }
            Err(e) => warn!(device_manager_id = %identifier, error = %e, "Unable to list node devices"),
        }
        Ok(())
    }

    pub async fn unregister_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        let Some(device_manager) = device_manager else {
            return Err(DomainError::InvalidObjectReference(
                "cannot unregister a nil device manager".to_string(),
            ));
        };
        let ior = device_manager.ior();
        let Some(node) = self.registry.device_manager_by_ior(&ior).await else {
            return Err(DomainError::DeviceManagerNotRegistered(ior));
        };
        self.drop_device_manager(&node).await;
        info!(device_manager_id = %node.identifier, "Device manager unregistered");
        Ok(())
    }

    /// Forget a device manager with everything it brought into the domain
    async fn drop_device_manager(&self, node: &DeviceManagerNode) {
        self.registry.remove_device_manager(&node.identifier).await;
        self.connections
            .device_manager_unregistered(&node.identifier)
            .await;

        for device in self.registry.remove_devices_of(&node.identifier).await {
            self.release_dependent_applications(&device.identifier).await;
            self.connections.device_unregistered(&device.identifier).await;
            self.publish(self.removed(&device.identifier, &device.label, SourceCategory::Device))
                .await;
        }
        for service in self.registry.remove_services_of(&node.identifier).await {
            self.connections.service_unregistered(&service.name).await;
            self.publish(self.removed(&service.service_id, &service.name, SourceCategory::Service))
                .await;
        }
        self.publish(self.removed(&node.identifier, &node.label, SourceCategory::DeviceManager))
            .await;

        self.persist_device_managers().await;
        self.persist_devices().await;
        self.persist_services().await;
        self.persist_connections().await;
    }

    async fn load_configuration(
        &self,
        device_manager: &dyn DeviceManagerRef,
    ) -> Option<DeviceConfiguration> {
        let profile = match device_manager.device_configuration_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Unable to read node descriptor path");
                return None;
            }
        };
        match self.profiles.load_device_configuration(&profile) {
            Ok(configuration) => Some(configuration),
            Err(e) => {
                warn!(profile = %profile, error = %e, "Unable to load node descriptor");
                None
            }
        }
    }

    // Devices

    pub async fn register_device(
        &self,
        device: Option<Arc<dyn Device>>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        let Some(device) = device else {
            return Err(DomainError::InvalidObjectReference(
                "cannot register a nil device".to_string(),
            ));
        };
        let Some(device_manager) = device_manager else {
            return Err(DomainError::InvalidObjectReference(
                "device registered without a device manager".to_string(),
            ));
        };
        self.check_running()?;
        let manager_ior = device_manager.ior();
        let Some(manager) = self.registry.device_manager_by_ior(&manager_ior).await else {
            return Err(DomainError::DeviceManagerNotRegistered(manager_ior));
        };

        let identifier = device.identifier().await?;
        if let Some(existing) = self.registry.device(&identifier).await {
            if existing.device.ior() == device.ior() || !existing.device.non_existent().await {
                debug!(device_id = %identifier, "Device already registered");
                return Ok(());
            }
            info!(device_id = %identifier, "Replacing registration of a device that no longer exists");
        }

        let label = device.label().await?;
        let software_profile = device.software_profile().await?;
        let implementation_id = match device_manager.component_implementation_id(&identifier).await {
            Ok(id) => id,
            Err(e) => {
                warn!(device_id = %identifier, error = %e, "Unable to read device implementation");
                String::new()
            }
        };

        let device_ior = device.ior();
        let (properties, is_loadable, is_executable) =
            self.device_properties(&software_profile, &implementation_id);
        let requires: Vec<DataType> = manager
            .configuration
            .as_ref()
            .and_then(|c| c.instantiation(&identifier))
            .map(|(_, inst)| inst.device_requires.clone())
            .unwrap_or_default();

        self.registry
            .put_device(DeviceNode {
                identifier: identifier.clone(),
                label: label.clone(),
                software_profile,
                implementation_id,
                properties,
                requires,
                device_manager_id: manager.identifier.clone(),
                device_manager,
                device,
                is_loadable,
                is_executable,
            })
            .await;
        self.persist_devices().await;
        info!(
            device_id = %identifier,
            label = %label,
            device_manager_id = %manager.identifier,
            "Device registered"
        );
        self.publish(self.added(&identifier, &label, SourceCategory::Device, Some(device_ior)))
            .await;

        self.connections.device_registered(&identifier).await;
        self.persist_connections().await;
        self.persist_event_channels().await;
        Ok(())
    }

    /// Merged properties of a device's package and implementation, plus its kind
    fn device_properties(&self, spd_path: &str, implementation_id: &str) -> (Properties, bool, bool) {
        let spd = match self.profiles.load_soft_pkg(spd_path) {
            Ok(spd) => spd,
            Err(e) => {
                warn!(profile = %spd_path, error = %e, "Unable to load device profile");
                return (Properties::default(), false, false);
            }
        };
        let mut properties = Properties::default();
        let files = spd.properties_file.iter().chain(
            spd.implementation(implementation_id)
                .and_then(|i| i.properties_file.as_ref()),
        );
        for file in files {
            let path = self.profiles.relative_to(spd_path, file);
            match self.profiles.load_properties(&path) {
                Ok(prf) => properties.merge(&prf),
                Err(e) => warn!(profile = %path, error = %e, "Unable to load property file"),
            }
        }
        (properties, spd.is_loadable(), spd.is_executable())
    }

    pub async fn unregister_device(&self, device: Option<Arc<dyn Device>>) -> Result<()> {
        let Some(device) = device else {
            return Err(DomainError::InvalidObjectReference(
                "cannot unregister a nil device".to_string(),
            ));
        };
        let ior = device.ior();
        let Some(node) = self.registry.device_by_ior(&ior).await else {
            return Err(DomainError::InvalidObjectReference(format!(
                "device {ior} is not registered"
            )));
        };
        self.registry.remove_device(&node.identifier).await;
        self.release_dependent_applications(&node.identifier).await;
        self.connections.device_unregistered(&node.identifier).await;

        self.persist_devices().await;
        self.persist_connections().await;
        info!(device_id = %node.identifier, "Device unregistered");
        self.publish(self.removed(&node.identifier, &node.label, SourceCategory::Device))
            .await;
        Ok(())
    }

    async fn release_dependent_applications(&self, device_id: &str) {
        let dependent: Vec<String> = self
            .registry
            .applications()
            .await
            .into_iter()
            .filter(|a| a.depends_on_device(device_id))
            .map(|a| a.identifier)
            .collect();
        for application_id in dependent {
            info!(
                application_id = %application_id,
                device_id = %device_id,
                "Releasing application that depends on a departing device"
            );
            if let Err(e) = self.release_application(&application_id).await {
                warn!(application_id = %application_id, error = %e, "Unable to release application");
            }
        }
    }

    // Services

    pub async fn register_service(
        &self,
        service: Option<ObjectRef>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
        name: &str,
    ) -> Result<()> {
        let Some(service) = service else {
            return Err(DomainError::InvalidObjectReference(
                "cannot register a nil service".to_string(),
            ));
        };
        let Some(device_manager) = device_manager else {
            return Err(DomainError::InvalidObjectReference(
                "service registered without a device manager".to_string(),
            ));
        };
        self.check_running()?;
        let manager_ior = device_manager.ior();
        let Some(manager) = self.registry.device_manager_by_ior(&manager_ior).await else {
            return Err(DomainError::DeviceManagerNotRegistered(manager_ior));
        };

        let service_id = manager
            .configuration
            .as_ref()
            .and_then(|c| {
                c.placements
                    .iter()
                    .flat_map(|p| p.instantiations.iter())
                    .find(|inst| inst.usage_name == name)
                    .map(|inst| inst.id.clone())
            })
            .unwrap_or_else(|| name.to_string());

        let service_ior = service.ior();
        let added = self
            .registry
            .add_service(ServiceNode {
                name: name.to_string(),
                service_id: service_id.clone(),
                device_manager_id: manager.identifier.clone(),
                service,
            })
            .await;
        if !added {
            debug!(service = %name, "Service already registered");
            return Ok(());
        }
        self.persist_services().await;
        info!(service = %name, device_manager_id = %manager.identifier, "Service registered");
        self.publish(self.added(&service_id, name, SourceCategory::Service, Some(service_ior)))
            .await;

        self.connections.service_registered(name).await;
        self.persist_connections().await;
        Ok(())
    }

    pub async fn unregister_service(&self, service: Option<ObjectRef>, name: &str) -> Result<()> {
        if service.is_none() {
            return Err(DomainError::InvalidObjectReference(
                "cannot unregister a nil service".to_string(),
            ));
        }
        let Some(node) = self.registry.remove_service(name).await else {
            return Err(DomainError::InvalidObjectReference(format!(
                "service '{name}' is not registered"
            )));
        };
        self.connections.service_unregistered(name).await;
        self.persist_services().await;
        self.persist_connections().await;
        info!(service = %name, "Service unregistered");
        self.publish(self.removed(&node.service_id, name, SourceCategory::Service))
            .await;
        Ok(())
    }

    // Remote domains

    pub async fn register_remote_domain_manager(
        &self,
        domain_manager: Option<Arc<dyn DomainManagerRef>>,
    ) -> Result<()> {
        let Some(domain_manager) = domain_manager else {
            return Err(DomainError::InvalidObjectReference(
                "cannot register a nil domain manager".to_string(),
            ));
        };
        let identifier = domain_manager.identifier().await?;
        let name = domain_manager.name().await?;
        if identifier == self.identifier {
            return Err(DomainError::RegisterError(
                "a domain cannot register with itself".to_string(),
            ));
        }
        let added = self
            .registry
            .add_remote_domain(DomainManagerNode {
                identifier: identifier.clone(),
                name: name.clone(),
                domain_manager,
            })
            .await;
        if !added {
            debug!(domain = %name, "Remote domain already registered");
            return Ok(());
        }
        self.persist_domain_managers().await;
        info!(domain = %name, identifier = %identifier, "Remote domain registered");
        Ok(())
    }

    pub async fn unregister_remote_domain_manager(&self, identifier: &str) -> Result<()> {
        let Some(node) = self.registry.remove_remote_domain(identifier).await else {
            return Err(DomainError::InvalidObjectReference(format!(
                "remote domain '{identifier}' is not registered"
            )));
        };
        self.persist_domain_managers().await;
        info!(domain = %node.name, identifier = %identifier, "Remote domain unregistered");
        Ok(())
    }

    // Applications

    /// Install an application profile, returning its identifier
    pub async fn install_application(&self, profile: &str) -> Result<String> {
        self.check_running()?;
        let assembly = self.profiles.load_software_assembly(profile)?;
        let added = self
            .registry
            .add_app_factory(AppFactoryNode {
                identifier: assembly.id.clone(),
                name: assembly.name.clone(),
                profile: profile.to_string(),
            })
            .await;
        if !added {
            return Err(DomainError::ApplicationAlreadyInstalled(assembly.id));
        }
        self.persist_app_factories().await;
        info!(application = %assembly.name, identifier = %assembly.id, "Application installed");
        self.publish(self.added(
            &assembly.id,
            &assembly.name,
            SourceCategory::ApplicationFactory,
            None,
        ))
        .await;
        Ok(assembly.id)
    }

    pub async fn uninstall_application(&self, identifier: &str) -> Result<()> {
        let Some(factory) = self.registry.remove_app_factory(identifier).await else {
            return Err(DomainError::InvalidIdentifier(identifier.to_string()));
        };
        self.persist_app_factories().await;
        info!(identifier = %identifier, "Application uninstalled");
        self.publish(self.removed(
            &factory.identifier,
            &factory.name,
            SourceCategory::ApplicationFactory,
        ))
        .await;
        Ok(())
    }

    /// Track a running application
    pub async fn add_application(&self, application: ApplicationNode) -> Result<()> {
        self.check_running()?;
        let identifier = application.identifier.clone();
        let name = application.name.clone();
        let ior = application.object.as_ref().map(|o| o.ior());
        if self.registry.application(&identifier).await.is_some() {
            debug!(application_id = %identifier, "Replacing application record");
        }
        self.registry.put_application(application).await;
        self.persist_applications().await;
        info!(application_id = %identifier, "Application added");
        self.publish(self.added(&identifier, &name, SourceCategory::Application, ior))
            .await;

        self.connections.application_registered(&identifier).await;
        self.persist_connections().await;
        Ok(())
    }

    /// Disconnect an application, return its capacity and forget it
    pub async fn release_application(&self, identifier: &str) -> Result<()> {
        let Some(mut application) = self.registry.remove_application(identifier).await else {
            return Err(DomainError::ApplicationNotFound(identifier.to_string()));
        };

        for connection in application.connections.iter_mut().rev() {
            connection.disconnect(self.registry.as_ref()).await;
        }
        if !application.allocation_ids.is_empty() {
            if let Err(e) = self.allocations.deallocate(&application.allocation_ids).await {
                warn!(application_id = %identifier, error = %e, "Unable to return application capacity");
            }
        }
        self.connections.application_unregistered(identifier).await;
        let pruned = self.registry.prune_event_channels().await;
        if !pruned.is_empty() {
            debug!(channels = ?pruned, "Destroyed unused event channels");
        }

        self.persist_applications().await;
        self.persist_connections().await;
        self.persist_event_channels().await;
        info!(application_id = %identifier, "Application released");
        self.publish(self.removed(identifier, &application.name, SourceCategory::Application))
            .await;
        Ok(())
    }

    // Connections

    pub async fn connect(
        &self,
        uses: Endpoint,
        provides: Endpoint,
        requester_id: &str,
        connection_id: &str,
    ) -> Result<String> {
        self.check_running()?;
        let record_id = self
            .connections
            .connect(uses, provides, requester_id, connection_id)
            .await?;
        self.persist_connections().await;
        self.persist_event_channels().await;
        Ok(record_id)
    }

    pub async fn disconnect(&self, record_id: &str) -> Result<()> {
        self.connections.break_connection(record_id).await?;
        self.registry.prune_event_channels().await;
        self.persist_connections().await;
        self.persist_event_channels().await;
        Ok(())
    }

    pub async fn connections(&self) -> Vec<ConnectionStatus> {
        self.connections.connections().await
    }

    // Lookups and listings

    pub async fn lookup_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        self.registry.lookup_domain_object(kind, name).await
    }

    pub async fn lookup_component_by_instantiation_id(&self, identifier: &str) -> Option<ObjectRef> {
        self.registry
            .lookup_component_by_instantiation_id(identifier)
            .await
    }

    pub async fn lookup_device_manager_by_instantiation_id(
        &self,
        identifier: &str,
    ) -> Option<ObjectRef> {
        self.registry
            .lookup_device_manager_by_instantiation_id(identifier)
            .await
    }

    /// Take a reference on an event channel, creating it on first use
    pub async fn acquire_event_channel(&self, name: &str) -> Result<Option<ObjectRef>> {
        let channel = self.registry.event_channel(name).await?;
        if channel.is_some() {
            self.registry.increment_event_channel_connections(name).await;
            self.persist_event_channels().await;
        }
        Ok(channel)
    }

    /// Drop a reference on an event channel; the last one destroys it
    pub async fn release_event_channel(&self, name: &str) -> u32 {
        let remaining = self.registry.decrement_event_channel_connections(name).await;
        if remaining == 0 {
            self.registry.prune_event_channels().await;
        }
        self.persist_event_channels().await;
        remaining
    }

    pub async fn device_managers(&self) -> Vec<DeviceManagerNode> {
        self.registry.device_managers().await
    }

    pub async fn devices(&self) -> Vec<DeviceNode> {
        self.registry.devices().await
    }

    pub async fn services(&self) -> Vec<ServiceNode> {
        self.registry.services().await
    }

    pub async fn applications(&self) -> Vec<ApplicationNode> {
        self.registry.applications().await
    }

    pub async fn app_factories(&self) -> Vec<AppFactoryNode> {
        self.registry.app_factories().await
    }

    pub async fn remote_domains(&self) -> Vec<DomainManagerNode> {
        self.registry.remote_domains().await
    }

    pub async fn event_channels(&self) -> Vec<EventChannelNode> {
        self.registry.event_channels().await
    }

    // Shutdown

    /// Release every application, shut down every node and close the store
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Domain shutdown already in progress");
            return;
        }
        info!(domain = %self.name(), "Shutting down domain");

        for application in self.registry.applications().await {
            if let Err(e) = self.release_application(&application.identifier).await {
                warn!(application_id = %application.identifier, error = %e, "Unable to release application");
            }
        }

        for node in self.registry.device_managers().await {
            if let Err(e) = node.device_manager.shutdown().await {
                error!(
                    device_manager_id = %node.identifier,
                    error = %e,
                    "Device manager did not shut down"
                );
            }
            // A node that shut down cleanly has already unregistered itself
            if self.registry.device_manager(&node.identifier).await.is_some() {
                self.drop_device_manager(&node).await;
            }
        }

        let name = self.registry.domain_name().to_string();
        let naming = self.registry.naming();
        match naming.unbind(&format!("{name}/{name}")).await {
            Ok(()) | Err(NamingError::NotFound(_)) => {}
            Err(e) => warn!(error = %e, "Unable to unbind domain"),
        }

        self.registry.unpin_event_channel(ODM_CHANNEL).await;
        self.registry.prune_event_channels().await;
        self.persist_event_channels().await;

        self.persistence.close().await;
        self.shut_down.store(true, Ordering::SeqCst);
        info!(domain = %name, "Domain shut down");
    }

    fn check_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DomainError::ShuttingDown);
        }
        Ok(())
    }

    // Persistence

    async fn persist_all(&self) {
        self.persist_device_managers().await;
        self.persist_devices().await;
        self.persist_services().await;
        self.persist_connections().await;
        self.persist_app_factories().await;
        self.persist_applications().await;
        self.persist_domain_managers().await;
        self.persist_event_channels().await;
    }

    async fn persist_device_managers(&self) {
        let records: Vec<DeviceManagerRecord> = self
            .registry
            .device_managers()
            .await
            .iter()
            .map(DeviceManagerNode::to_record)
            .collect();
        self.persistence.save(KEY_DEVICE_MANAGERS, &records).await;
    }

    async fn persist_devices(&self) {
        let records: Vec<DeviceRecord> = self
            .registry
            .devices()
            .await
            .iter()
            .map(DeviceNode::to_record)
            .collect();
        self.persistence.save(KEY_DEVICES, &records).await;
    }

    async fn persist_services(&self) {
        let records: Vec<ServiceRecord> = self
            .registry
            .services()
            .await
            .iter()
            .map(ServiceNode::to_record)
            .collect();
        self.persistence.save(KEY_SERVICES, &records).await;
    }

    async fn persist_connections(&self) {
        let records = self.connections.records().await;
        self.persistence.save(KEY_CONNECTIONS, &records).await;
    }

    async fn persist_app_factories(&self) {
        let factories = self.registry.app_factories().await;
        self.persistence.save(KEY_APP_FACTORIES, &factories).await;
    }

    async fn persist_applications(&self) {
        let records: Vec<ApplicationRecord> = self
            .registry
            .applications()
            .await
            .iter()
            .map(ApplicationNode::to_record)
            .collect();
        self.persistence.save(KEY_APPLICATIONS, &records).await;
    }

    async fn persist_domain_managers(&self) {
        let records: Vec<DomainManagerRecord> = self
            .registry
            .remote_domains()
            .await
            .iter()
            .map(DomainManagerNode::to_record)
            .collect();
        self.persistence.save(KEY_DOMAIN_MANAGERS, &records).await;
    }

    async fn persist_event_channels(&self) {
        let records: Vec<EventChannelRecord> = self
            .registry
            .event_channels()
            .await
            .iter()
            .map(EventChannelNode::to_record)
            .collect();
        self.persistence.save(KEY_EVENT_CHANNELS, &records).await;
    }
}

#[async_trait]
impl RemoteObject for DomainManager {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    async fn non_existent(&self) -> bool {
        self.is_shut_down()
    }
}

#[async_trait]
impl DomainManagerRef for DomainManager {
    async fn identifier(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.identifier.clone())
    }

    async fn name(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.registry.domain_name().to_string())
    }

    async fn allocation_manager(
        &self,
    ) -> std::result::Result<Arc<dyn RemoteAllocationManager>, RemoteError> {
        Ok(self.allocations.clone())
    }

    async fn register_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        DomainManager::register_device_manager(self, device_manager).await
    }

    async fn unregister_device_manager(
        &self,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        DomainManager::unregister_device_manager(self, device_manager).await
    }

    async fn register_device(
        &self,
        device: Option<Arc<dyn Device>>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        DomainManager::register_device(self, device, device_manager).await
    }

    async fn unregister_device(&self, device: Option<Arc<dyn Device>>) -> Result<()> {
        DomainManager::unregister_device(self, device).await
    }

    async fn register_service(
        &self,
        service: Option<ObjectRef>,
        device_manager: Option<Arc<dyn DeviceManagerRef>>,
        name: &str,
    ) -> Result<()> {
        DomainManager::register_service(self, service, device_manager, name).await
    }

    async fn unregister_service(&self, service: Option<ObjectRef>, name: &str) -> Result<()> {
        DomainManager::unregister_service(self, service, name).await
    }
}
