//! In-process remote objects
//! Devices, components, ports and event channels that live inside the daemon.
//! They answer the same ports a remote object would, which lets a node run
//! devices in-process and lets whole-system tests drive the control plane.

use crate::domain::ports::{
    Device, EventChannelFactory, EventPublisher, LifeCycle, ObjectRef, PortSupplier, RemoteObject,
    UsesPort,
};
use crate::domain::value_objects::{DataType, DomainEvent, UsageState};
use crate::domain::RemoteError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

fn new_ior(kind: &str) -> String {
    format!("IOR:{kind}:{}", Uuid::new_v4())
}

/// Poisoning only follows a panic in another holder; the data is still usable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// Ports

/// Uses port keeping one provides reference per connection id
pub struct LocalUsesPort {
    ior: String,
    connections: Mutex<BTreeMap<String, ObjectRef>>,
}

impl LocalUsesPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior("UsesPort"),
            connections: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn connection_ids(&self) -> Vec<String> {
        lock(&self.connections).keys().cloned().collect()
    }

    /// The provides reference behind a connection
    pub fn connected_to(&self, connection_id: &str) -> Option<String> {
        lock(&self.connections).get(connection_id).map(|p| p.ior())
    }
}

impl RemoteObject for LocalUsesPort {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    fn as_uses_port(&self) -> Option<&dyn UsesPort> {
        Some(self)
    }
}

#[async_trait]
impl UsesPort for LocalUsesPort {
    async fn connect_port(&self, provides: ObjectRef, connection_id: &str) -> Result<(), RemoteError> {
        let mut connections = lock(&self.connections);
        if connections.contains_key(connection_id) {
            return Err(RemoteError::OccupiedPort);
        }
        connections.insert(connection_id.to_string(), provides);
        Ok(())
    }

    async fn disconnect_port(&self, connection_id: &str) -> Result<(), RemoteError> {
        lock(&self.connections)
            .remove(connection_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::InvalidPort(format!("no connection '{connection_id}'")))
    }
}

/// Provides port; only its identity matters
pub struct LocalProvidesPort {
    ior: String,
}

impl LocalProvidesPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior("ProvidesPort"),
        })
    }
}

impl RemoteObject for LocalProvidesPort {
    fn ior(&self) -> String {
        self.ior.clone()
    }
}

// Components and services

/// Component or service handing out a fixed set of ports
pub struct LocalComponent {
    ior: String,
    identifier: String,
    ports: HashMap<String, ObjectRef>,
    alive: AtomicBool,
}

impl LocalComponent {
    pub fn new(identifier: &str, ports: Vec<(&str, ObjectRef)>) -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior("Component"),
            identifier: identifier.to_string(),
            ports: ports
                .into_iter()
                .map(|(name, port)| (name.to_string(), port))
                .collect(),
            alive: AtomicBool::new(true),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Simulate the component's process going away
    pub fn terminate(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteObject for LocalComponent {
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
impl PortSupplier for LocalComponent {
    async fn get_port(&self, name: &str) -> Result<ObjectRef, RemoteError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(RemoteError::ObjectNotExist);
        }
        self.ports
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::UnknownPort(name.to_string()))
    }
}

// Devices

/// Device with numeric capacities that allocations draw down
pub struct LocalDevice {
    ior: String,
    identifier: String,
    label: String,
    software_profile: String,
    capacities: Mutex<HashMap<String, f64>>,
    initial: Mutex<HashMap<String, f64>>,
    configured: Mutex<Vec<DataType>>,
    alive: AtomicBool,
}

impl LocalDevice {
    pub fn new(identifier: &str, label: &str, software_profile: &str) -> Arc<Self> {
        Arc::new(Self {
            ior: new_ior("Device"),
            identifier: identifier.to_string(),
            label: label.to_string(),
            software_profile: software_profile.to_string(),
            capacities: Mutex::new(HashMap::new()),
            initial: Mutex::new(HashMap::new()),
            configured: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
        })
    }

    pub fn with_capacity(self: Arc<Self>, id: &str, amount: f64) -> Arc<Self> {
        lock(&self.capacities).insert(id.to_string(), amount);
        lock(&self.initial).insert(id.to_string(), amount);
        self
    }

    pub fn capacity(&self, id: &str) -> Option<f64> {
        lock(&self.capacities).get(id).copied()
    }

    /// Every property written by `configure`, oldest first
    pub fn configured(&self) -> Vec<DataType> {
        lock(&self.configured).clone()
    }

    pub fn terminate(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn check_alive(&self) -> Result<(), RemoteError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::ObjectNotExist)
        }
    }
}

#[async_trait]
impl RemoteObject for LocalDevice {
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
impl LifeCycle for LocalDevice {
    async fn initialize(&self) -> Result<(), RemoteError> {
        self.check_alive()
    }

    async fn release_object(&self) -> Result<(), RemoteError> {
        self.check_alive()?;
        info!(device_id = %self.identifier, "Device released");
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Device for LocalDevice {
    async fn identifier(&self) -> Result<String, RemoteError> {
        self.check_alive()?;
        Ok(self.identifier.clone())
    }

    async fn label(&self) -> Result<String, RemoteError> {
        self.check_alive()?;
        Ok(self.label.clone())
    }

    async fn software_profile(&self) -> Result<String, RemoteError> {
        self.check_alive()?;
        Ok(self.software_profile.clone())
    }

    async fn usage_state(&self) -> Result<UsageState, RemoteError> {
        self.check_alive()?;
        let capacities = lock(&self.capacities);
        let initial = lock(&self.initial);
        if capacities.is_empty() {
            return Ok(UsageState::Idle);
        }
        if capacities.values().all(|v| *v <= 0.0) {
            return Ok(UsageState::Busy);
        }
        let untouched = capacities
            .iter()
            .all(|(id, v)| initial.get(id).is_some_and(|i| i == v));
        Ok(if untouched {
            UsageState::Idle
        } else {
            UsageState::Active
        })
    }

    async fn configure(&self, properties: &[DataType]) -> Result<(), RemoteError> {
        self.check_alive()?;
        debug!(device_id = %self.identifier, count = properties.len(), "Device configured");
        lock(&self.configured).extend(properties.iter().cloned());
        Ok(())
    }

    async fn allocate_capacity(&self, properties: &[DataType]) -> Result<bool, RemoteError> {
        self.check_alive()?;
        let mut capacities = lock(&self.capacities);
        let mut requested = Vec::with_capacity(properties.len());
        for prop in properties {
            let Some(amount) = prop.value.as_f64() else {
                return Err(RemoteError::InvalidCapacity(prop.id.clone()));
            };
            match capacities.get(&prop.id) {
                Some(available) if *available >= amount => requested.push((&prop.id, amount)),
                Some(_) => return Ok(false),
                None => return Err(RemoteError::InvalidCapacity(prop.id.clone())),
            }
        }
        for (id, amount) in requested {
            if let Some(available) = capacities.get_mut(id) {
                *available -= amount;
            }
        }
        Ok(true)
    }

    async fn deallocate_capacity(&self, properties: &[DataType]) -> Result<(), RemoteError> {
        self.check_alive()?;
        let mut capacities = lock(&self.capacities);
        let initial = lock(&self.initial);
        for prop in properties {
            let (Some(available), Some(amount)) = (capacities.get_mut(&prop.id), prop.value.as_f64())
            else {
                return Err(RemoteError::InvalidCapacity(prop.id.clone()));
            };
            let ceiling = initial.get(&prop.id).copied().unwrap_or(f64::MAX);
            *available = (*available + amount).min(ceiling);
        }
        Ok(())
    }
}

// Event channels

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fans published events out to every current subscriber
pub struct LocalEventChannel {
    ior: String,
    name: String,
    sender: broadcast::Sender<DomainEvent>,
}

impl LocalEventChannel {
    fn new(name: &str) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ior: new_ior("EventChannel"),
            name: name.to_string(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl RemoteObject for LocalEventChannel {
    fn ior(&self) -> String {
        self.ior.clone()
    }

    fn as_event_publisher(&self) -> Option<&dyn EventPublisher> {
        Some(self)
    }
}

#[async_trait]
impl EventPublisher for LocalEventChannel {
    async fn publish(&self, event: &DomainEvent) -> Result<(), RemoteError> {
        // No subscribers is not an error
        let delivered = self.sender.send(event.clone()).unwrap_or(0);
        debug!(channel = %self.name, subscribers = delivered, "Event published");
        Ok(())
    }
}

#[derive(Default)]
pub struct LocalEventChannelFactory {
    channels: Mutex<BTreeMap<String, Arc<LocalEventChannel>>>,
}

impl LocalEventChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_names(&self) -> Vec<String> {
        lock(&self.channels).keys().cloned().collect()
    }

    pub fn channel(&self, name: &str) -> Option<Arc<LocalEventChannel>> {
        lock(&self.channels).get(name).cloned()
    }
}

#[async_trait]
impl EventChannelFactory for LocalEventChannelFactory {
    async fn create_channel(&self, name: &str) -> Result<ObjectRef, RemoteError> {
        let mut channels = lock(&self.channels);
        let channel: ObjectRef = channels
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LocalEventChannel::new(name)))
            .clone();
        Ok(channel)
    }

    async fn destroy_channel(&self, name: &str) -> Result<(), RemoteError> {
        lock(&self.channels)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::InvalidState(format!("no event channel '{name}'")))
    }
}
