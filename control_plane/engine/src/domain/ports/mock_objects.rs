//! Mock remote objects for unit tests
//! In-memory stand-ins that record the calls made on them.

use crate::domain::constants::{
    FINDER_APPLICATION, FINDER_EVENT_CHANNEL, FINDER_SERVICE_NAME,
};
use crate::domain::entities::{
    AllocationRequest, AllocationResponse, AllocationStatus, DeviceConfiguration, DeviceLocation,
    Properties, SoftPkg, SoftwareAssembly,
};
use crate::domain::ports::{
    ConnectionManager, Device, DeviceManagerRef, DomainLookup, DomainManagerRef,
    EventChannelFactory, EventPublisher, LaunchConfig,
    LaunchResult, LifeCycle, NamingService, ObjectBroker, ObjectRef, PersistenceStore, PortSupplier,
    ProcessLauncher, ProfileRepository, RemoteAllocationManager, RemoteObject, UsesPort,
};
use crate::domain::value_objects::{ChildExitStatus, DataType, DomainEvent, UsageState};
use crate::domain::{DomainError, NamingError, PersistenceError, RemoteError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use uuid::Uuid;

fn new_ior() -> String {
    format!("IOR:{}", Uuid::new_v4())
}

/// Port that records connect and disconnect calls
pub struct MockPort {
    ior: String,
    connections: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
    occupied: AtomicBool,
    hung: AtomicBool,
}

impl MockPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior(),
            connections: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            occupied: AtomicBool::new(false),
            hung: AtomicBool::new(false),
        })
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_occupied(&self, occupied: bool) {
        self.occupied.store(occupied, Ordering::SeqCst);
    }

    /// Make `connect_port` never return, like a peer that stopped answering
    pub fn set_hung(&self, hung: bool) {
        self.hung.store(hung, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for MockPort {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    fn as_uses_port(&self) -> Option<&dyn UsesPort> {
        Some(self)
    }
}

#[async_trait]
impl UsesPort for MockPort {
    async fn connect_port(&self, _provides: ObjectRef, connection_id: &str) -> std::result::Result<(), RemoteError> {
        if self.hung.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.occupied.load(Ordering::SeqCst) {
            return Err(RemoteError::OccupiedPort);
        }
        self.connections.lock().unwrap().push(connection_id.to_string());
        Ok(())
    }

    async fn disconnect_port(&self, connection_id: &str) -> std::result::Result<(), RemoteError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connections.lock().unwrap().retain(|c| c != connection_id);
        Ok(())
    }
}

/// Component with a fixed set of ports
pub struct MockComponent {
    identifier: String,
    ior: String,
    ports: HashMap<String, Arc<MockPort>>,
    alive: AtomicBool,
}

impl MockComponent {
    pub fn new(identifier: &str) -> Arc<Self> {
        Self::with_ports(identifier, &[])
    }

    pub fn with_ports(identifier: &str, ports: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            ior: new_ior(),
            ports: ports
                .iter()
                .map(|name| (name.to_string(), MockPort::new()))
                .collect(),
            alive: AtomicBool::new(true),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn port(&self, name: &str) -> Arc<MockPort> {
        self.ports
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("mock component has no port '{name}'"))
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for MockComponent {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    async fn non_existent(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    fn as_port_supplier(&self) -> Option<&dyn PortSupplier> {
        Some(self)
    }
}

#[async_trait]
impl PortSupplier for MockComponent {
    async fn get_port(&self, name: &str) -> std::result::Result<ObjectRef, RemoteError> {
        self.ports
            .get(name)
            .map(|p| p.clone() as ObjectRef)
            .ok_or_else(|| RemoteError::UnknownPort(name.to_string()))
    }
}

/// Device with numeric capacities drawn down by `allocate_capacity`
pub struct MockDevice {
    identifier: String,
    label: String,
    software_profile: String,
    ior: String,
    alive: AtomicBool,
    usage: Mutex<UsageState>,
    capacities: Mutex<HashMap<String, f64>>,
    calls: Mutex<Vec<(String, Vec<DataType>)>>,
    allocate_error: Mutex<Option<RemoteError>>,
    configured: Mutex<Vec<DataType>>,
    released: AtomicUsize,
}

impl MockDevice {
    pub fn new(identifier: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            label: format!("{identifier}_label"),
            software_profile: "/devices/mock/mock.spd.yaml".to_string(),
            ior: new_ior(),
            alive: AtomicBool::new(true),
            usage: Mutex::new(UsageState::Idle),
            capacities: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            allocate_error: Mutex::new(None),
            configured: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
        })
    }

    pub fn with_capacity(self: Arc<Self>, id: &str, amount: f64) -> Arc<Self> {
        self.capacities.lock().unwrap().insert(id.to_string(), amount);
        self
    }

    pub fn capacity(&self, id: &str) -> f64 {
        self.capacities.lock().unwrap().get(id).copied().unwrap_or(0.0)
    }

    pub fn set_usage_state(&self, state: UsageState) {
        *self.usage.lock().unwrap() = state;
    }

    pub fn fail_allocations_with(&self, error: RemoteError) {
        *self.allocate_error.lock().unwrap() = Some(error);
    }

    /// Calls made so far, as ("allocate" | "deallocate", properties)
    pub fn calls(&self) -> Vec<(String, Vec<DataType>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn configured(&self) -> Vec<DataType> {
        self.configured.lock().unwrap().clone()
    }

    pub fn release_calls(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for MockDevice {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    async fn non_existent(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    fn as_life_cycle(&self) -> Option<&dyn LifeCycle> {
        Some(self)
    }
}

#[async_trait]
impl LifeCycle for MockDevice {
    async fn initialize(&self) -> std::result::Result<(), RemoteError> {
        Ok(())
    }

    async fn release_object(&self) -> std::result::Result<(), RemoteError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn identifier(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.identifier.clone())
    }

    async fn label(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.label.clone())
    }

    async fn software_profile(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.software_profile.clone())
    }

    async fn usage_state(&self) -> std::result::Result<UsageState, RemoteError> {
        Ok(*self.usage.lock().unwrap())
    }

    async fn configure(&self, properties: &[DataType]) -> std::result::Result<(), RemoteError> {
        self.configured.lock().unwrap().extend(properties.iter().cloned());
        Ok(())
    }

    async fn allocate_capacity(&self, properties: &[DataType]) -> std::result::Result<bool, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(("allocate".to_string(), properties.to_vec()));
        if let Some(err) = self.allocate_error.lock().unwrap().clone() {
            return Err(err);
        }

        let mut capacities = self.capacities.lock().unwrap();
        for prop in properties {
            let requested = prop.value.as_f64().unwrap_or(0.0);
            match capacities.get(&prop.id) {
                Some(available) if *available >= requested => {}
                _ => return Ok(false),
            }
        }
        for prop in properties {
            if let Some(available) = capacities.get_mut(&prop.id) {
                *available -= prop.value.as_f64().unwrap_or(0.0);
            }
        }
        Ok(true)
    }

    async fn deallocate_capacity(&self, properties: &[DataType]) -> std::result::Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(("deallocate".to_string(), properties.to_vec()));
        let mut capacities = self.capacities.lock().unwrap();
        for prop in properties {
            if let Some(available) = capacities.get_mut(&prop.id) {
                *available += prop.value.as_f64().unwrap_or(0.0);
            }
        }
        Ok(())
    }
}

pub struct MockDeviceManager {
    identifier: String,
    label: String,
    ior: String,
    alive: AtomicBool,
    devices: Mutex<Vec<Arc<dyn Device>>>,
    shutdowns: AtomicUsize,
}

impl MockDeviceManager {
    pub fn new(identifier: &str) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.to_string(),
            label: format!("DevMgr_{identifier}"),
            ior: new_ior(),
            alive: AtomicBool::new(true),
            devices: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn add_device(&self, device: Arc<dyn Device>) {
        self.devices.lock().unwrap().push(device);
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for MockDeviceManager {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    async fn non_existent(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceManagerRef for MockDeviceManager {
    async fn identifier(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.identifier.clone())
    }

    async fn label(&self) -> std::result::Result<String, RemoteError> {
        Ok(self.label.clone())
    }

    async fn device_configuration_profile(&self) -> std::result::Result<String, RemoteError> {
        Ok(String::new())
    }

    async fn registered_devices(&self) -> std::result::Result<Vec<Arc<dyn Device>>, RemoteError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn component_implementation_id(
        &self,
        _instantiation_id: &str,
    ) -> std::result::Result<String, RemoteError> {
        Ok("cpp".to_string())
    }

    async fn shutdown(&self) -> std::result::Result<(), RemoteError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Domain that records registrations made by a device manager
pub struct MockDomain {
    ior: String,
    devices: Mutex<Vec<String>>,
    services: Mutex<Vec<String>>,
    device_managers: AtomicUsize,
    fail_services: AtomicBool,
}

impl MockDomain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior(),
            devices: Mutex::new(Vec::new()),
            services: Mutex::new(Vec::new()),
            device_managers: AtomicUsize::new(0),
            fail_services: AtomicBool::new(false),
        })
    }

    pub fn devices(&self) -> Vec<String> {
        self.devices.lock().unwrap().clone()
    }

    pub fn services(&self) -> Vec<String> {
        self.services.lock().unwrap().clone()
    }

    pub fn device_manager_count(&self) -> usize {
        self.device_managers.load(Ordering::SeqCst)
    }

    pub fn reject_services(&self) {
        self.fail_services.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for MockDomain {
    fn ior(&self) -> String {
        self.ior.clone()
    }
}

#[async_trait]
impl DomainManagerRef for MockDomain {
    async fn identifier(&self) -> std::result::Result<String, RemoteError> {
        Ok("DCE:mock-domain".to_string())
    }

    async fn name(&self) -> std::result::Result<String, RemoteError> {
        Ok("MOCK_DOMAIN".to_string())
    }

    async fn allocation_manager(
        &self,
    ) -> std::result::Result<Arc<dyn RemoteAllocationManager>, RemoteError> {
        Err(RemoteError::ObjectNotExist)
    }

    async fn register_device_manager(
        &self,
        _device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        self.device_managers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister_device_manager(
        &self,
        _device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        self.device_managers.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register_device(
        &self,
        device: Option<Arc<dyn Device>>,
        _device_manager: Option<Arc<dyn DeviceManagerRef>>,
    ) -> Result<()> {
        let device = device.ok_or_else(|| DomainError::InvalidObjectReference("nil".into()))?;
        let id = device.identifier().await?;
        self.devices.lock().unwrap().push(id);
        Ok(())
    }

    async fn unregister_device(&self, device: Option<Arc<dyn Device>>) -> Result<()> {
        let device = device.ok_or_else(|| DomainError::InvalidObjectReference("nil".into()))?;
        let id = device.identifier().await?;
        self.devices.lock().unwrap().retain(|d| *d != id);
        Ok(())
    }

    async fn register_service(
        &self,
        _service: Option<ObjectRef>,
        _device_manager: Option<Arc<dyn DeviceManagerRef>>,
        name: &str,
    ) -> Result<()> {
        if self.fail_services.load(Ordering::SeqCst) {
            return Err(DomainError::RegisterError(format!("service {name} rejected")));
        }
        self.services.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn unregister_service(&self, _service: Option<ObjectRef>, name: &str) -> Result<()> {
        self.services.lock().unwrap().retain(|s| s != name);
        Ok(())
    }
}

/// Remote allocation manager whose devices always grant the request
pub struct MockRemoteAllocationManager {
    ior: String,
    device: Arc<MockDevice>,
    device_manager: Arc<MockDeviceManager>,
    granted: Mutex<Vec<String>>,
    deallocated: Mutex<Vec<String>>,
}

impl MockRemoteAllocationManager {
    pub fn new(device: Arc<MockDevice>) -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior(),
            device,
            device_manager: MockDeviceManager::new("DCE:remote-node"),
            granted: Mutex::new(Vec::new()),
            deallocated: Mutex::new(Vec::new()),
        })
    }

    pub fn deallocated(&self) -> Vec<String> {
        self.deallocated.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteObject for MockRemoteAllocationManager {
    fn ior(&self) -> String {
        self.ior.clone()
    }
}

#[async_trait]
impl RemoteAllocationManager for MockRemoteAllocationManager {
    async fn allocate_local(
        &self,
        requests: Vec<AllocationRequest>,
        _requesting_domain: &str,
    ) -> Result<Vec<AllocationResponse>> {
        let mut responses = Vec::new();
        for request in requests {
            let allocation_id = Uuid::new_v4().to_string();
            self.granted.lock().unwrap().push(allocation_id.clone());
            responses.push(AllocationResponse {
                request_id: request.request_id,
                allocation_id,
                properties: request.properties,
                device: self.device.clone(),
                device_manager: self.device_manager.clone(),
            });
        }
        Ok(responses)
    }

    async fn deallocate(&self, allocation_ids: &[String]) -> Result<()> {
        self.deallocated
            .lock()
            .unwrap()
            .extend(allocation_ids.iter().cloned());
        Ok(())
    }

    async fn local_allocations(&self, _allocation_ids: &[String]) -> Result<Vec<AllocationStatus>> {
        Ok(Vec::new())
    }

    async fn local_devices(&self) -> Result<Vec<DeviceLocation>> {
        Ok(vec![DeviceLocation {
            domain_name: "REMOTE_DOMAIN".to_string(),
            device_manager: self.device_manager.clone(),
            device: self.device.clone(),
        }])
    }
}

#[derive(Default)]
pub struct MockBroker {
    objects: Mutex<HashMap<String, ObjectRef>>,
    devices: Mutex<HashMap<String, Arc<dyn Device>>>,
    device_managers: Mutex<HashMap<String, Arc<dyn DeviceManagerRef>>>,
    domain_managers: Mutex<HashMap<String, Arc<dyn DomainManagerRef>>>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, object: ObjectRef) {
        self.objects.lock().unwrap().insert(object.ior(), object);
    }

    pub fn register_device(&self, device: Arc<dyn Device>) {
        self.register(device.clone());
        self.devices.lock().unwrap().insert(device.ior(), device);
    }

    pub fn register_device_manager(&self, device_manager: Arc<dyn DeviceManagerRef>) {
        self.register(device_manager.clone());
        self.device_managers
            .lock()
            .unwrap()
            .insert(device_manager.ior(), device_manager);
    }

    pub fn register_domain_manager(&self, domain_manager: Arc<dyn DomainManagerRef>) {
        self.register(domain_manager.clone());
        self.domain_managers
            .lock()
            .unwrap()
            .insert(domain_manager.ior(), domain_manager);
    }
}

impl ObjectBroker for MockBroker {
    fn object(&self, ior: &str) -> Option<ObjectRef> {
        self.objects.lock().unwrap().get(ior).cloned()
    }

    fn device(&self, ior: &str) -> Option<Arc<dyn Device>> {
        self.devices.lock().unwrap().get(ior).cloned()
    }

    fn device_manager(&self, ior: &str) -> Option<Arc<dyn DeviceManagerRef>> {
        self.device_managers.lock().unwrap().get(ior).cloned()
    }

    fn domain_manager(&self, ior: &str) -> Option<Arc<dyn DomainManagerRef>> {
        self.domain_managers.lock().unwrap().get(ior).cloned()
    }

    fn allocation_manager(&self, _ior: &str) -> Option<Arc<dyn RemoteAllocationManager>> {
        None
    }
}

/// Connection manager over plain maps, also acting as the domain lookup
pub struct MockConnectionManager {
    components: Mutex<HashMap<String, ObjectRef>>,
    services: Mutex<HashMap<String, ObjectRef>>,
    applications: Mutex<HashMap<String, ObjectRef>>,
    channels: Mutex<HashMap<String, (ObjectRef, u32)>>,
    loaded_devices: Mutex<HashMap<String, ObjectRef>>,
    broker: Arc<MockBroker>,
}

impl MockConnectionManager {
    pub fn new() -> Self {
        Self {
            components: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            applications: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            loaded_devices: Mutex::new(HashMap::new()),
            broker: MockBroker::new(),
        }
    }

    pub fn broker(&self) -> Arc<MockBroker> {
        self.broker.clone()
    }

    pub fn add_component(&self, identifier: &str, object: ObjectRef) {
        self.components
            .lock()
            .unwrap()
            .insert(identifier.to_string(), object);
    }

    pub fn remove_component(&self, identifier: &str) {
        self.components.lock().unwrap().remove(identifier);
    }

    pub fn add_service(&self, name: &str, object: ObjectRef) {
        self.services.lock().unwrap().insert(name.to_string(), object);
    }

    pub fn add_application(&self, identifier: &str, object: ObjectRef) {
        self.applications
            .lock()
            .unwrap()
            .insert(identifier.to_string(), object);
    }

    pub fn add_event_channel(&self, name: &str) {
        self.channels
            .lock()
            .unwrap()
            .insert(name.to_string(), (MockComponent::new(name) as ObjectRef, 0));
    }

    pub fn add_loaded_device(&self, component_id: &str, device: ObjectRef) {
        self.loaded_devices
            .lock()
            .unwrap()
            .insert(component_id.to_string(), device);
    }

    pub fn event_channel_count(&self, name: &str) -> u32 {
        self.channels
            .lock()
            .unwrap()
            .get(name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DomainLookup for MockConnectionManager {
    async fn lookup_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        match kind {
            FINDER_SERVICE_NAME => Ok(self.services.lock().unwrap().get(name).cloned()),
            FINDER_APPLICATION => self
                .applications
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| DomainError::LookupError(format!("no application {name}"))),
            FINDER_EVENT_CHANNEL => {
                let mut channels = self.channels.lock().unwrap();
                Ok(channels.get_mut(name).map(|(channel, count)| {
                    *count += 1;
                    channel.clone()
                }))
            }
            other => Err(DomainError::InvalidObjectType(other.to_string())),
        }
    }

    async fn increment_event_channel_connections(&self, name: &str) -> u32 {
        let mut channels = self.channels.lock().unwrap();
        channels
            .get_mut(name)
            .map(|(_, count)| {
                *count += 1;
                *count
            })
            .unwrap_or(0)
    }

    async fn decrement_event_channel_connections(&self, name: &str) -> u32 {
        let mut channels = self.channels.lock().unwrap();
        channels
            .get_mut(name)
            .map(|(_, count)| {
                *count = count.saturating_sub(1);
                *count
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConnectionManager for MockConnectionManager {
    async fn resolve_component(&self, identifier: &str) -> Option<ObjectRef> {
        self.components.lock().unwrap().get(identifier).cloned()
    }

    async fn resolve_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        self.lookup_domain_object(kind, name).await
    }

    async fn resolve_find_by_naming_service(&self, _name: &str) -> Option<ObjectRef> {
        None
    }

    async fn resolve_device_that_loaded(&self, component_id: &str) -> Option<ObjectRef> {
        self.loaded_devices.lock().unwrap().get(component_id).cloned()
    }

    async fn resolve_device_used_by_component(
        &self,
        _component_id: &str,
        _uses_id: &str,
    ) -> Option<ObjectRef> {
        None
    }

    async fn resolve_device_used_by_application(&self, _uses_id: &str) -> Option<ObjectRef> {
        None
    }

    async fn release_event_channel(&self, name: &str) {
        self.decrement_event_channel_connections(name).await;
    }
}

/// Key/value store that outlives the domains built on it
#[derive(Default)]
pub struct MockStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl PersistenceStore for MockStore {
    async fn open(&self) -> std::result::Result<(), PersistenceError> {
        Ok(())
    }

    async fn store(&self, key: &str, value: &[u8]) -> std::result::Result<(), PersistenceError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn del(&self, key: &str) -> std::result::Result<(), PersistenceError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), PersistenceError> {
        Ok(())
    }
}

/// Event channel keeping everything published on it
pub struct MockEventChannel {
    ior: String,
    published: Mutex<Vec<DomainEvent>>,
}

impl MockEventChannel {
    pub fn published(&self) -> Vec<DomainEvent> {
        self.published.lock().unwrap().clone()
    }
}

impl RemoteObject for MockEventChannel {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    fn as_event_publisher(&self) -> Option<&dyn EventPublisher> {
        Some(self)
    }
}

#[async_trait]
impl EventPublisher for MockEventChannel {
    async fn publish(&self, event: &DomainEvent) -> std::result::Result<(), RemoteError> {
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEventChannels {
    channels: Mutex<HashMap<String, Arc<MockEventChannel>>>,
    destroyed: Mutex<Vec<String>>,
}

impl MockEventChannels {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn channel(&self, name: &str) -> Option<Arc<MockEventChannel>> {
        self.channels.lock().unwrap().get(name).cloned()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventChannelFactory for MockEventChannels {
    async fn create_channel(&self, name: &str) -> std::result::Result<ObjectRef, RemoteError> {
        let channel: ObjectRef = self
            .channels
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MockEventChannel {
                    ior: new_ior(),
                    published: Mutex::new(Vec::new()),
                })
            })
            .clone();
        Ok(channel)
    }

    async fn destroy_channel(&self, name: &str) -> std::result::Result<(), RemoteError> {
        self.channels.lock().unwrap().remove(name);
        self.destroyed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Naming service over a flat map of bound paths
#[derive(Default)]
pub struct MockNaming {
    bindings: Mutex<HashMap<String, ObjectRef>>,
    contexts: Mutex<Vec<String>>,
}

impl MockNaming {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_bound(&self, path: &str) -> bool {
        self.bindings.lock().unwrap().contains_key(path)
    }

    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NamingService for MockNaming {
    async fn bind_new_context(&self, path: &str) -> std::result::Result<(), NamingError> {
        let mut contexts = self.contexts.lock().unwrap();
        if contexts.iter().any(|c| c == path) {
            return Err(NamingError::AlreadyBound(path.to_string()));
        }
        contexts.push(path.to_string());
        Ok(())
    }

    async fn bind(&self, path: &str, object: ObjectRef) -> std::result::Result<(), NamingError> {
        let mut bindings = self.bindings.lock().unwrap();
        if bindings.contains_key(path) {
            return Err(NamingError::AlreadyBound(path.to_string()));
        }
        bindings.insert(path.to_string(), object);
        Ok(())
    }

    async fn rebind(&self, path: &str, object: ObjectRef) -> std::result::Result<(), NamingError> {
        self.bindings.lock().unwrap().insert(path.to_string(), object);
        Ok(())
    }

    async fn unbind(&self, path: &str) -> std::result::Result<(), NamingError> {
        self.bindings
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| NamingError::NotFound(path.to_string()))
    }

    async fn resolve(&self, path: &str) -> std::result::Result<ObjectRef, NamingError> {
        self.bindings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| NamingError::NotFound(path.to_string()))
    }

    async fn destroy_context(&self, path: &str) -> std::result::Result<(), NamingError> {
        let prefix = format!("{path}/");
        self.bindings
            .lock()
            .unwrap()
            .retain(|name, _| !name.starts_with(&prefix));
        self.contexts
            .lock()
            .unwrap()
            .retain(|c| c != path && !c.starts_with(&prefix));
        Ok(())
    }
}

/// Launcher that hands out fake pids. A process runs until it is killed,
/// terminated (unless it ignores SIGTERM) or told to exit.
pub struct MockLauncher {
    next_pid: AtomicU32,
    running: Mutex<HashMap<u32, oneshot::Sender<ChildExitStatus>>>,
    launches: Mutex<Vec<(u32, LaunchConfig)>>,
    signals: Mutex<Vec<(u32, i32)>>,
    ignore_sigterm: AtomicBool,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            running: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            ignore_sigterm: AtomicBool::new(false),
        })
    }

    pub fn ignore_sigterm(&self) {
        self.ignore_sigterm.store(true, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<(u32, LaunchConfig)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<(u32, i32)> {
        self.signals.lock().unwrap().clone()
    }

    /// Make a running process exit on its own
    pub fn exit(&self, pid: u32, code: i32) {
        if let Some(tx) = self.running.lock().unwrap().remove(&pid) {
            let _ = tx.send(ChildExitStatus::Exited(code));
        }
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn launch(&self, config: LaunchConfig) -> Result<LaunchResult> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.running.lock().unwrap().insert(pid, tx);
        self.launches.lock().unwrap().push((pid, config));
        Ok(LaunchResult {
            pid,
            exit_handle: Box::pin(async move {
                rx.await.map_err(|_| DomainError::LaunchFailed {
                    id: pid.to_string(),
                    reason: "launcher dropped".into(),
                })
            }),
        })
    }

    async fn signal(&self, pid: u32, signal: i32) -> Result<()> {
        self.signals.lock().unwrap().push((pid, signal));
        let obeys = signal == libc::SIGKILL
            || (signal == libc::SIGTERM && !self.ignore_sigterm.load(Ordering::SeqCst));
        if obeys {
            if let Some(tx) = self.running.lock().unwrap().remove(&pid) {
                let _ = tx.send(ChildExitStatus::Signaled(signal));
            }
        }
        Ok(())
    }

    async fn is_running(&self, pid: u32) -> bool {
        self.running.lock().unwrap().contains_key(&pid)
    }
}

/// Profiles held in memory, keyed by path
#[derive(Default)]
pub struct MockProfiles {
    soft_pkgs: Mutex<HashMap<String, SoftPkg>>,
    properties: Mutex<HashMap<String, Properties>>,
    configurations: Mutex<HashMap<String, DeviceConfiguration>>,
    assemblies: Mutex<HashMap<String, SoftwareAssembly>>,
}

impl MockProfiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_soft_pkg(&self, path: &str, spd: SoftPkg) {
        self.soft_pkgs.lock().unwrap().insert(path.to_string(), spd);
    }

    pub fn add_properties(&self, path: &str, properties: Properties) {
        self.properties
            .lock()
            .unwrap()
            .insert(path.to_string(), properties);
    }

    pub fn add_device_configuration(&self, path: &str, dcd: DeviceConfiguration) {
        self.configurations
            .lock()
            .unwrap()
            .insert(path.to_string(), dcd);
    }

    pub fn add_software_assembly(&self, path: &str, sad: SoftwareAssembly) {
        self.assemblies.lock().unwrap().insert(path.to_string(), sad);
    }
}

fn missing(path: &str) -> DomainError {
    DomainError::InvalidProfile {
        path: path.to_string(),
        reason: "not found".into(),
    }
}

impl ProfileRepository for MockProfiles {
    fn load_soft_pkg(&self, path: &str) -> Result<SoftPkg> {
        self.soft_pkgs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
    }

    fn load_properties(&self, path: &str) -> Result<Properties> {
        self.properties
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
    }

    fn load_device_configuration(&self, path: &str) -> Result<DeviceConfiguration> {
        self.configurations
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
    }

    fn load_software_assembly(&self, path: &str) -> Result<SoftwareAssembly> {
        self.assemblies
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
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
        PathBuf::from(path)
    }
}
