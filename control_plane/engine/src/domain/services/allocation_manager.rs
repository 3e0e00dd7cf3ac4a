//! Allocation Manager
//! Matches capacity requests against the registered devices, first fit in
//! caller order, and federates what is left over to remote domains.
//!
//! A device matches a request when:
//! - it is alive and not BUSY
//! - its requirements and the request's device requirements are the same set
//! - processor and OS dependencies agree with its allocation properties
//! - every requested property is one of its allocation properties and compares
//!   true under the property's action
//!
//! Properties with the `external` action are then drawn from the device with
//! `allocate_capacity`, one partition at a time.

use crate::domain::constants::{
    KEY_LOCAL_ALLOCATIONS, KEY_REMOTE_ALLOCATIONS, PROP_OS_NAME, PROP_OS_VERSION,
    PROP_PROCESSOR_NAME,
};
use crate::domain::entities::{
    AllocationRecord, AllocationRequest, AllocationResponse, AllocationStatus, DeviceLocation,
    DeviceNode, LocalAllocation, Properties, RemoteAllocation,
};
use crate::domain::ports::{Device, ObjectBroker, RemoteAllocationManager, RemoteObject};
use crate::domain::services::domain_registry::DomainRegistry;
use crate::domain::services::state_persistence::StatePersistence;
use crate::domain::value_objects::{compare, Action, DataType, PropertyValue, UsageState};
use crate::domain::{DomainError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Default)]
struct AllocationTables {
    local: BTreeMap<String, LocalAllocation>,
    remote: BTreeMap<String, RemoteAllocation>,
}

pub struct AllocationManager {
    ior: String,
    domain_name: String,
    registry: Arc<DomainRegistry>,
    persistence: StatePersistence,
    tables: Mutex<AllocationTables>,
}

impl AllocationManager {
    pub fn new(registry: Arc<DomainRegistry>, persistence: StatePersistence) -> Self {
        Self {
            ior: format!("IOR:{}", Uuid::new_v4()),
            domain_name: registry.domain_name().to_string(),
            registry,
            persistence,
            tables: Mutex::new(AllocationTables::default()),
        }
    }

    /// Allocate locally, then ask remote domains for whatever is left.
    /// Responses may be fewer than requests.
    pub async fn allocate(&self, requests: Vec<AllocationRequest>) -> Result<Vec<AllocationResponse>> {
        let mut responses = self
            .allocate_devices(requests.clone(), &self.domain_name)
            .await;
        if responses.len() == requests.len() {
            return Ok(responses);
        }

        let mut granted_remotely = false;
        for remote in self.registry.remote_domains().await {
            let unfilled = unfilled_requests(&requests, &responses);
            if unfilled.is_empty() {
                break;
            }

            let manager = match remote.domain_manager.allocation_manager().await {
                Ok(manager) => manager,
                Err(e) => {
                    warn!(domain = %remote.name, error = %e, "Remote domain has no allocation manager");
                    continue;
                }
            };
            let remote_responses = match manager.allocate_local(unfilled, &self.domain_name).await {
                Ok(responses) => responses,
                Err(e) => {
                    warn!(domain = %remote.name, error = %e, "Remote allocation failed");
                    continue;
                }
            };

            let mut tables = self.tables.lock().await;
            for response in remote_responses {
                debug!(
                    allocation_id = %response.allocation_id,
                    domain = %remote.name,
                    "Remote allocation granted"
                );
                tables.remote.insert(
                    response.allocation_id.clone(),
                    RemoteAllocation {
                        allocation: LocalAllocation {
                            allocation_id: response.allocation_id.clone(),
                            requesting_domain: self.domain_name.clone(),
                            source_id: String::new(),
                            properties: response.properties.clone(),
                            device: response.device.clone(),
                            device_manager: response.device_manager.clone(),
                        },
                        allocation_manager: manager.clone(),
                    },
                );
                granted_remotely = true;
                responses.push(response);
            }
        }

        if granted_remotely {
            self.persist_remote().await;
        }
        Ok(responses)
    }

    /// Allocate against this domain's devices only
    pub async fn allocate_local(
        &self,
        requests: Vec<AllocationRequest>,
        requesting_domain: &str,
    ) -> Vec<AllocationResponse> {
        self.allocate_devices(requests, requesting_domain).await
    }

    /// Allocate one deployment request against an explicit device list
    pub async fn allocate_deployment(
        &self,
        request: AllocationRequest,
        devices: &[DeviceNode],
    ) -> Option<AllocationResponse> {
        let candidates: Vec<&DeviceNode> = devices.iter().collect();
        let allocation = self
            .allocate_request(&request, &candidates, &self.domain_name)
            .await?;
        let response = response_for(&request, &allocation);
        self.tables
            .lock()
            .await
            .local
            .insert(allocation.allocation_id.clone(), allocation);
        self.persist_local().await;
        Some(response)
    }

    async fn allocate_devices(
        &self,
        requests: Vec<AllocationRequest>,
        requesting_domain: &str,
    ) -> Vec<AllocationResponse> {
        let devices = self.registry.devices().await;
        let mut granted = Vec::new();

        for request in &requests {
            if request.requested_devices.iter().any(Option::is_none) {
                warn!(request_id = %request.request_id, "Request names a nil device, skipping");
                continue;
            }

            let candidates: Vec<&DeviceNode> = if request.requested_devices.is_empty() {
                devices.iter().collect()
            } else {
                request
                    .requested_devices
                    .iter()
                    .flatten()
                    .filter_map(|wanted| {
                        let ior = wanted.ior();
                        devices.iter().find(|d| d.device.ior() == ior)
                    })
                    .collect()
            };

            match self
                .allocate_request(request, &candidates, requesting_domain)
                .await
            {
                Some(allocation) => granted.push((response_for(request, &allocation), allocation)),
                None => debug!(request_id = %request.request_id, "No device satisfies request"),
            }
        }

        if granted.is_empty() {
            return Vec::new();
        }

        let mut responses = Vec::with_capacity(granted.len());
        {
            let mut tables = self.tables.lock().await;
            for (response, allocation) in granted {
                tables
                    .local
                    .insert(allocation.allocation_id.clone(), allocation);
                responses.push(response);
            }
        }
        self.persist_local().await;
        responses
    }

    async fn allocate_request(
        &self,
        request: &AllocationRequest,
        candidates: &[&DeviceNode],
        requesting_domain: &str,
    ) -> Option<LocalAllocation> {
        for node in candidates {
            let Some(allocated) = self.allocate_device(request, node).await else {
                continue;
            };
            let allocation_id = Uuid::new_v4().to_string();
            info!(
                allocation_id = %allocation_id,
                request_id = %request.request_id,
                device_id = %node.identifier,
                "Allocation granted"
            );
            return Some(LocalAllocation {
                allocation_id,
                requesting_domain: requesting_domain.to_string(),
                source_id: request.source_id.clone(),
                properties: allocated,
                device: node.device.clone(),
                device_manager: node.device_manager.clone(),
            });
        }
        None
    }

    /// The external properties drawn from the device, or `None` if it did not match
    async fn allocate_device(
        &self,
        request: &AllocationRequest,
        node: &DeviceNode,
    ) -> Option<Vec<DataType>> {
        if node.device.non_existent().await {
            debug!(device_id = %node.identifier, "Skipping device that no longer exists");
            return None;
        }
        match node.device.usage_state().await {
            Ok(UsageState::Busy) => {
                trace!(device_id = %node.identifier, "Skipping busy device");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(device_id = %node.identifier, error = %e, "Unable to read usage state");
                return None;
            }
        }

        if !requirements_match(&node.requires, &request.device_requires) {
            trace!(device_id = %node.identifier, "Device requirements do not match");
            return None;
        }

        let external = match check_device_matching(&node.properties, request) {
            Some(external) => external,
            None => {
                trace!(device_id = %node.identifier, "Device properties do not match");
                return None;
            }
        };
        if external.is_empty() {
            return Some(external);
        }

        let partitions = partition_properties(&external);
        if complete_allocations(node.device.as_ref(), &partitions).await {
            Some(external)
        } else {
            None
        }
    }

    /// Release allocations. Every known id is released even when some are
    /// unknown; the unknown ones are reported together.
    pub async fn deallocate(&self, allocation_ids: &[String]) -> Result<()> {
        let mut invalid = Vec::new();
        let mut local_changed = false;
        let mut remote_changed = false;

        for allocation_id in allocation_ids {
            let local = self.tables.lock().await.local.remove(allocation_id);
            if let Some(allocation) = local {
                deallocate_local(&allocation).await;
                local_changed = true;
                continue;
            }

            let remote = self.tables.lock().await.remote.remove(allocation_id);
            if let Some(allocation) = remote {
                if let Err(e) = allocation
                    .allocation_manager
                    .deallocate(std::slice::from_ref(allocation_id))
                    .await
                {
                    debug!(allocation_id = %allocation_id, error = %e, "Remote deallocation failed");
                }
                remote_changed = true;
                continue;
            }

            invalid.push(allocation_id.clone());
        }

        if local_changed {
            self.persist_local().await;
        }
        if remote_changed {
            self.persist_remote().await;
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidAllocationId(invalid))
        }
    }

    /// Local then remote allocations. An empty id list means all of them.
    pub async fn allocations(&self, allocation_ids: &[String]) -> Result<Vec<AllocationStatus>> {
        let tables = self.tables.lock().await;
        if allocation_ids.is_empty() {
            return Ok(tables
                .local
                .values()
                .map(LocalAllocation::status)
                .chain(tables.remote.values().map(|r| r.allocation.status()))
                .collect());
        }

        let mut result = Vec::new();
        let mut invalid = Vec::new();
        for allocation_id in allocation_ids {
            if let Some(allocation) = tables.local.get(allocation_id) {
                result.push(allocation.status());
            } else if let Some(allocation) = tables.remote.get(allocation_id) {
                result.push(allocation.allocation.status());
            } else {
                invalid.push(allocation_id.clone());
            }
        }
        if invalid.is_empty() {
            Ok(result)
        } else {
            Err(DomainError::InvalidAllocationId(invalid))
        }
    }

    pub async fn local_allocations(&self, allocation_ids: &[String]) -> Result<Vec<AllocationStatus>> {
        let tables = self.tables.lock().await;
        if allocation_ids.is_empty() {
            return Ok(tables.local.values().map(LocalAllocation::status).collect());
        }

        let mut result = Vec::new();
        let mut invalid = Vec::new();
        for allocation_id in allocation_ids {
            match tables.local.get(allocation_id) {
                Some(allocation) => result.push(allocation.status()),
                None => invalid.push(allocation_id.clone()),
            }
        }
        if invalid.is_empty() {
            Ok(result)
        } else {
            Err(DomainError::InvalidAllocationId(invalid))
        }
    }

    pub async fn local_devices(&self) -> Vec<DeviceLocation> {
        self.registry
            .devices()
            .await
            .into_iter()
            .map(|d| DeviceLocation {
                domain_name: self.domain_name.clone(),
                device_manager: d.device_manager,
                device: d.device,
            })
            .collect()
    }

    /// Local devices followed by those of every remote domain that answers
    pub async fn all_devices(&self) -> Vec<DeviceLocation> {
        let mut result = self.local_devices().await;
        for remote in self.registry.remote_domains().await {
            let manager = match remote.domain_manager.allocation_manager().await {
                Ok(manager) => manager,
                Err(e) => {
                    debug!(domain = %remote.name, error = %e, "Skipping unreachable domain");
                    continue;
                }
            };
            match manager.local_devices().await {
                Ok(devices) => {
                    trace!(domain = %remote.name, count = devices.len(), "Adding remote devices");
                    result.extend(devices);
                }
                Err(e) => debug!(domain = %remote.name, error = %e, "Unable to list remote devices"),
            }
        }
        result
    }

    /// Devices allocation policy permits. No policy is applied, so these are the local devices.
    pub async fn authorized_devices(&self) -> Vec<DeviceLocation> {
        self.local_devices().await
    }

    pub async fn restore_local_allocations(&self, records: &[AllocationRecord], broker: &dyn ObjectBroker) {
        let mut tables = self.tables.lock().await;
        for record in records {
            match LocalAllocation::from_record(record, broker) {
                Some(allocation) => {
                    tables.local.insert(allocation.allocation_id.clone(), allocation);
                }
                None => warn!(
                    allocation_id = %record.allocation_id,
                    "Unable to restore allocation, its device is gone"
                ),
            }
        }
    }

    pub async fn restore_remote_allocations(&self, records: &[AllocationRecord], broker: &dyn ObjectBroker) {
        let mut tables = self.tables.lock().await;
        for record in records {
            match RemoteAllocation::from_record(record, broker) {
                Some(allocation) => {
                    tables
                        .remote
                        .insert(allocation.allocation.allocation_id.clone(), allocation);
                }
                None => warn!(
                    allocation_id = %record.allocation_id,
                    "Unable to restore remote allocation"
                ),
            }
        }
    }

    async fn persist_local(&self) {
        let records: Vec<AllocationRecord> = self
            .tables
            .lock()
            .await
            .local
            .values()
            .map(LocalAllocation::to_record)
            .collect();
        self.persistence.save(KEY_LOCAL_ALLOCATIONS, &records).await;
    }

    async fn persist_remote(&self) {
        let records: Vec<AllocationRecord> = self
            .tables
            .lock()
            .await
            .remote
            .values()
            .map(RemoteAllocation::to_record)
            .collect();
        self.persistence.save(KEY_REMOTE_ALLOCATIONS, &records).await;
    }
}

#[async_trait]
impl RemoteObject for AllocationManager {
    fn ior(&self) -> String {
        self.ior.clone()
    }
}

#[async_trait]
impl RemoteAllocationManager for AllocationManager {
    async fn allocate_local(
        &self,
        requests: Vec<AllocationRequest>,
        requesting_domain: &str,
    ) -> Result<Vec<AllocationResponse>> {
        Ok(AllocationManager::allocate_local(self, requests, requesting_domain).await)
    }

    async fn deallocate(&self, allocation_ids: &[String]) -> Result<()> {
        AllocationManager::deallocate(self, allocation_ids).await
    }

    async fn local_allocations(&self, allocation_ids: &[String]) -> Result<Vec<AllocationStatus>> {
        AllocationManager::local_allocations(self, allocation_ids).await
    }

    async fn local_devices(&self) -> Result<Vec<DeviceLocation>> {
        Ok(AllocationManager::local_devices(self).await)
    }
}

fn response_for(request: &AllocationRequest, allocation: &LocalAllocation) -> AllocationResponse {
    AllocationResponse {
        request_id: request.request_id.clone(),
        allocation_id: allocation.allocation_id.clone(),
        properties: allocation.properties.clone(),
        device: allocation.device.clone(),
        device_manager: allocation.device_manager.clone(),
    }
}

fn unfilled_requests(
    requests: &[AllocationRequest],
    responses: &[AllocationResponse],
) -> Vec<AllocationRequest> {
    let filled: HashSet<&str> = responses.iter().map(|r| r.request_id.as_str()).collect();
    requests
        .iter()
        .filter(|r| !filled.contains(r.request_id.as_str()))
        .cloned()
        .collect()
}

async fn deallocate_local(allocation: &LocalAllocation) {
    for partition in partition_properties(&allocation.properties) {
        if let Err(e) = allocation.device.deallocate_capacity(&partition).await {
            warn!(
                allocation_id = %allocation.allocation_id,
                error = %e,
                "Device failed to deallocate capacity"
            );
        }
    }
    debug!(allocation_id = %allocation.allocation_id, "Allocation released");
}

/// Split properties into consecutive runs with no repeated id.
/// Concatenating the runs gives back the input.
pub fn partition_properties(properties: &[DataType]) -> Vec<Vec<DataType>> {
    let mut partitions: Vec<Vec<DataType>> = Vec::new();
    let mut current: Vec<DataType> = Vec::new();
    for property in properties {
        if current.iter().any(|p| p.id == property.id) {
            partitions.push(std::mem::take(&mut current));
        }
        current.push(property.clone());
    }
    if !current.is_empty() {
        partitions.push(current);
    }
    partitions
}

/// Allocate every partition in order. On any failure the partitions already
/// granted are deallocated in reverse order and the device is left as it was.
pub async fn complete_allocations(device: &dyn Device, partitions: &[Vec<DataType>]) -> bool {
    for (index, partition) in partitions.iter().enumerate() {
        let granted = match device.allocate_capacity(partition).await {
            Ok(granted) => granted,
            Err(e) => {
                debug!(error = %e, "allocateCapacity raised");
                false
            }
        };
        if granted {
            continue;
        }

        let mut warned = false;
        for done in partitions[..index].iter().rev() {
            if let Err(e) = device.deallocate_capacity(done).await {
                if !warned {
                    warn!(error = %e, "Unable to roll back partial allocation");
                    warned = true;
                }
            }
        }
        return false;
    }
    true
}

/// Both sides present the same requirement set, compared by id and value
fn requirements_match(device_requires: &[DataType], deployment_requires: &[DataType]) -> bool {
    if device_requires.len() != deployment_requires.len() {
        return false;
    }
    device_requires.iter().all(|required| {
        deployment_requires
            .iter()
            .any(|offered| offered.id == required.id && compare(&required.value, &offered.value, Action::Eq))
    })
}

/// `Some(external properties)` when the device matches the request
fn check_device_matching(properties: &Properties, request: &AllocationRequest) -> Option<Vec<DataType>> {
    if !request.processor_deps.is_empty() {
        let processor = properties.allocation_property(PROP_PROCESSOR_NAME)?;
        let name = processor.value.to_string();
        if !request.processor_deps.iter().any(|p| *p == name) {
            return None;
        }
    }

    if !request.os_deps.is_empty() {
        let os_name = properties.allocation_property(PROP_OS_NAME)?.value.to_string();
        let os_version = properties
            .allocation_property(PROP_OS_VERSION)
            .map(|p| p.value.to_string());
        let matched = request.os_deps.iter().any(|dep| {
            dep.name == os_name
                && match &dep.version {
                    Some(version) => os_version.as_deref() == Some(version.as_str()),
                    None => true,
                }
        });
        if !matched {
            return None;
        }
    }

    let mut external = Vec::new();
    for requested in &request.properties {
        let Some(def) = properties.allocation_property(&requested.id) else {
            trace!(property = %requested.id, "Device has no such allocation property");
            return None;
        };
        if def.is_external() {
            external.push(requested.clone());
            continue;
        }
        if !def.is_simple() {
            return None;
        }
        let value: PropertyValue = def.value_type.coerce(&requested.value)?;
        if !compare(&def.value, &value, def.action) {
            return None;
        }
    }
    Some(external)
}
