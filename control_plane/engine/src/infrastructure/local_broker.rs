//! Local Object Broker
//! Resolves stringified references to objects living in this process.
//! Handles are held weakly: once the last owner drops an object its
//! reference no longer resolves, the same as a dead remote object.

use crate::domain::ports::{
    Device, DeviceManagerRef, DomainManagerRef, ObjectBroker, ObjectRef, RemoteAllocationManager,
    RemoteObject,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::trace;

#[derive(Default)]
struct Tables {
    objects: HashMap<String, Weak<dyn RemoteObject>>,
    devices: HashMap<String, Weak<dyn Device>>,
    device_managers: HashMap<String, Weak<dyn DeviceManagerRef>>,
    domain_managers: HashMap<String, Weak<dyn DomainManagerRef>>,
    allocation_managers: HashMap<String, Weak<dyn RemoteAllocationManager>>,
}

impl Tables {
    fn prune(&mut self) {
        self.objects.retain(|_, o| o.strong_count() > 0);
        self.devices.retain(|_, o| o.strong_count() > 0);
        self.device_managers.retain(|_, o| o.strong_count() > 0);
        self.domain_managers.retain(|_, o| o.strong_count() > 0);
        self.allocation_managers.retain(|_, o| o.strong_count() > 0);
    }
}

#[derive(Default)]
pub struct LocalObjectBroker {
    tables: RwLock<Tables>,
}

impl LocalObjectBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.prune();
        tables
    }

    pub fn register_object(&self, object: &ObjectRef) {
        trace!(ior = %object.ior(), "Registered object");
        self.write()
            .objects
            .insert(object.ior(), Arc::downgrade(object));
    }

    pub fn register_device(&self, device: &Arc<dyn Device>) {
        let object: ObjectRef = device.clone();
        let mut tables = self.write();
        tables.objects.insert(device.ior(), Arc::downgrade(&object));
        tables.devices.insert(device.ior(), Arc::downgrade(device));
    }

    pub fn register_device_manager(&self, device_manager: &Arc<dyn DeviceManagerRef>) {
        let object: ObjectRef = device_manager.clone();
        let mut tables = self.write();
        tables
            .objects
            .insert(device_manager.ior(), Arc::downgrade(&object));
        tables
            .device_managers
            .insert(device_manager.ior(), Arc::downgrade(device_manager));
    }

    pub fn register_domain_manager(&self, domain_manager: &Arc<dyn DomainManagerRef>) {
        let object: ObjectRef = domain_manager.clone();
        let mut tables = self.write();
        tables
            .objects
            .insert(domain_manager.ior(), Arc::downgrade(&object));
        tables
            .domain_managers
            .insert(domain_manager.ior(), Arc::downgrade(domain_manager));
    }

    pub fn register_allocation_manager(&self, allocation_manager: &Arc<dyn RemoteAllocationManager>) {
        let object: ObjectRef = allocation_manager.clone();
        let mut tables = self.write();
        tables
            .objects
            .insert(allocation_manager.ior(), Arc::downgrade(&object));
        tables
            .allocation_managers
            .insert(allocation_manager.ior(), Arc::downgrade(allocation_manager));
    }

    pub fn unregister(&self, ior: &str) {
        let mut tables = self.write();
        tables.objects.remove(ior);
        tables.devices.remove(ior);
        tables.device_managers.remove(ior);
        tables.domain_managers.remove(ior);
        tables.allocation_managers.remove(ior);
    }

    /// Number of references that still resolve
    pub fn len(&self) -> usize {
        self.read()
            .objects
            .values()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectBroker for LocalObjectBroker {
    fn object(&self, ior: &str) -> Option<ObjectRef> {
        self.read().objects.get(ior).and_then(Weak::upgrade)
    }

    fn device(&self, ior: &str) -> Option<Arc<dyn Device>> {
        self.read().devices.get(ior).and_then(Weak::upgrade)
    }

    fn device_manager(&self, ior: &str) -> Option<Arc<dyn DeviceManagerRef>> {
        self.read().device_managers.get(ior).and_then(Weak::upgrade)
    }

    fn domain_manager(&self, ior: &str) -> Option<Arc<dyn DomainManagerRef>> {
        self.read().domain_managers.get(ior).and_then(Weak::upgrade)
    }

    fn allocation_manager(&self, ior: &str) -> Option<Arc<dyn RemoteAllocationManager>> {
        self.read()
            .allocation_managers
            .get(ior)
            .and_then(Weak::upgrade)
    }
}
