//! Domain Connection Manager
//! Owns every connection made at domain scope: the ones declared by node
//! deployment descriptors and the ones requested through the domain. A
//! connection whose endpoint is missing waits here until the object it depends
//! on registers.

use crate::domain::entities::{ConnectionDescriptor, ConnectionNode, ConnectionRecord, Endpoint};
use crate::domain::ports::{
    object_exists, ComponentLookup, ConnectionManager, DomainLookup, NamingService, ObjectRef,
};
use crate::domain::services::connection_resolver::ConnectionResolver;
use crate::domain::value_objects::DependencyType;
use crate::domain::{DomainError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary of one tracked connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub record_id: String,
    pub connection_id: String,
    pub requester_id: String,
    pub connected: bool,
    pub uses: String,
    pub provides: String,
}

#[derive(Default)]
struct ConnectionTable {
    by_requester: BTreeMap<String, Vec<ConnectionNode>>,
    record_ids: HashSet<String>,
    /// Record ids being retried outside the lock
    in_flight: HashSet<String>,
    /// Bumped on every registration that retries pending connections
    generation: u64,
}

impl ConnectionTable {
    fn unique_record_id(&self, requester: &str, identifier: &str) -> String {
        let base = format!("{requester}:{identifier}");
        if !self.record_ids.contains(&base) {
            return base;
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !self.record_ids.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn insert(&mut self, mut node: ConnectionNode) -> String {
        if node.record_id.is_empty() || self.record_ids.contains(&node.record_id) {
            node.record_id = self.unique_record_id(&node.requester_id, &node.identifier);
        }
        let record_id = node.record_id.clone();
        self.record_ids.insert(record_id.clone());
        self.put_back(node);
        record_id
    }

    /// Re-add a node whose record id is still reserved
    fn put_back(&mut self, node: ConnectionNode) {
        self.by_requester
            .entry(node.requester_id.clone())
            .or_default()
            .push(node);
    }

    fn find_mut(&mut self, record_id: &str) -> Option<&mut ConnectionNode> {
        self.by_requester
            .values_mut()
            .flatten()
            .find(|c| c.record_id == record_id)
    }

    fn remove(&mut self, record_id: &str) -> Option<ConnectionNode> {
        let mut removed = None;
        for connections in self.by_requester.values_mut() {
            if let Some(index) = connections.iter().position(|c| c.record_id == record_id) {
                removed = Some(connections.remove(index));
                break;
            }
        }
        self.by_requester.retain(|_, connections| !connections.is_empty());
        removed
    }
}

/// Ports are connected and disconnected with the table lock released.
pub struct DomainConnectionManager {
    resolver: ConnectionResolver,
    table: Mutex<ConnectionTable>,
}

impl DomainConnectionManager {
    pub fn new(
        domain: Arc<dyn DomainLookup>,
        components: Arc<dyn ComponentLookup>,
        naming: Arc<dyn NamingService>,
        domain_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver: ConnectionResolver::new(domain, components, naming, domain_name),
            table: Mutex::new(ConnectionTable::default()),
        }
    }

    /// Track a connection declared in a profile and try to establish it now.
    /// Returns the record id it is tracked under.
    pub async fn add_connection(
        &self,
        requester_id: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<String> {
        let node = ConnectionNode::parse(descriptor, requester_id)?;
        self.track(node).await
    }

    /// Connect two endpoints on behalf of a requester
    pub async fn connect(
        &self,
        uses: Endpoint,
        provides: Endpoint,
        requester_id: &str,
        connection_id: &str,
    ) -> Result<String> {
        let node = ConnectionNode::new(uses, provides, connection_id, requester_id);
        self.track(node).await
    }

    async fn track(&self, mut node: ConnectionNode) -> Result<String> {
        loop {
            let seen = self.table.lock().await.generation;
            let pending = match node.connect(self).await {
                Ok(connected) => !connected,
                Err(e) if node.allow_deferral() => {
                    warn!(
                        connection_id = %node.identifier,
                        error = %e,
                        "Connection failed, keeping it pending"
                    );
                    true
                }
                Err(e) => return Err(e),
            };

            let mut table = self.table.lock().await;
            // A registration slipped in while connecting; it may be the missing side
            if pending && table.generation != seen {
                continue;
            }
            if pending {
                info!(
                    connection_id = %node.identifier,
                    requester = %node.requester_id,
                    "Connection pending until its endpoints register"
                );
            }
            return Ok(table.insert(node));
        }
    }

    /// Disconnect and forget a connection
    pub async fn break_connection(&self, record_id: &str) -> Result<()> {
        let mut node = {
            let mut table = self.table.lock().await;
            let Some(node) = table.remove(record_id) else {
                return Err(DomainError::invalid_connection(
                    record_id,
                    "no connection with this id",
                ));
            };
            table.record_ids.remove(record_id);
            node
        };
        node.disconnect(self.resolver.domain()).await;
        info!(record_id = %record_id, "Connection broken");
        Ok(())
    }

    /// Put back a connection loaded from persistent state.
    /// One recorded as connected whose provides side has gone away is
    /// disconnected and left pending.
    pub async fn restore_connection(&self, mut node: ConnectionNode) {
        if node.connected {
            let uses_alive = match node.uses.cached() {
                Some(object) => object_exists(object).await,
                None => false,
            };
            let provides_alive = match node.provides.cached() {
                Some(object) => object_exists(object).await,
                None => false,
            };
            if uses_alive && !provides_alive {
                node.disconnect(self.resolver.domain()).await;
            } else if !uses_alive {
                node.connected = false;
                node.uses.release();
                node.provides.release();
            }
            if !node.connected {
                debug!(
                    connection_id = %node.identifier,
                    "Restored connection lost an endpoint, now pending"
                );
            }
        }
        self.table.lock().await.insert(node);
    }

    pub async fn device_registered(&self, device_id: &str) {
        self.try_pending(DependencyType::Component, device_id).await;
    }

    pub async fn device_unregistered(&self, device_id: &str) {
        self.break_dependent(DependencyType::Component, device_id)
            .await;
    }

    pub async fn service_registered(&self, name: &str) {
        self.try_pending(DependencyType::ServiceName, name).await;
    }

    pub async fn service_unregistered(&self, name: &str) {
        self.break_dependent(DependencyType::ServiceName, name).await;
    }

    pub async fn application_registered(&self, application_id: &str) {
        self.try_pending(DependencyType::Application, application_id)
            .await;
    }

    pub async fn application_unregistered(&self, application_id: &str) {
        self.break_dependent(DependencyType::Application, application_id)
            .await;
    }

    /// Break and forget every connection the device manager asked for
    pub async fn device_manager_unregistered(&self, device_manager_id: &str) {
        let mut connections = {
            let mut table = self.table.lock().await;
            let Some(connections) = table.by_requester.remove(device_manager_id) else {
                return;
            };
            for connection in &connections {
                table.record_ids.remove(&connection.record_id);
            }
            connections
        };
        for connection in connections.iter_mut() {
            connection.disconnect(self.resolver.domain()).await;
        }
        debug!(
            device_manager_id = %device_manager_id,
            count = connections.len(),
            "Dropped device manager connections"
        );
    }

    async fn try_pending(&self, kind: DependencyType, identifier: &str) {
        let candidates: Vec<ConnectionNode> = {
            let mut table = self.table.lock().await;
            table.generation += 1;
            let picked: Vec<ConnectionNode> = table
                .by_requester
                .values()
                .flatten()
                .filter(|c| {
                    !c.connected
                        && c.check_dependency(kind, identifier)
                        && !table.in_flight.contains(&c.record_id)
                })
                .cloned()
                .collect();
            for connection in &picked {
                table.in_flight.insert(connection.record_id.clone());
            }
            picked
        };

        let mut attempted = Vec::with_capacity(candidates.len());
        for mut connection in candidates {
            match connection.connect(self).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        connection_id = %connection.identifier,
                        "Connection still pending"
                    );
                }
                Err(e) => {
                    warn!(
                        connection_id = %connection.identifier,
                        error = %e,
                        "Pending connection failed"
                    );
                }
            }
            attempted.push(connection);
        }

        let mut orphans = Vec::new();
        {
            let mut table = self.table.lock().await;
            for connection in attempted {
                table.in_flight.remove(&connection.record_id);
                match table.find_mut(&connection.record_id) {
                    Some(slot) => *slot = connection,
                    // Broken while it was being connected
                    None => orphans.push(connection),
                }
            }
        }
        for mut orphan in orphans {
            orphan.disconnect(self.resolver.domain()).await;
        }
    }

    async fn break_dependent(&self, kind: DependencyType, identifier: &str) {
        let mut dependents = Vec::new();
        {
            let mut table = self.table.lock().await;
            for connections in table.by_requester.values_mut() {
                let mut index = 0;
                while index < connections.len() {
                    if connections[index].check_dependency(kind, identifier) {
                        dependents.push(connections.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }
            table.by_requester.retain(|_, connections| !connections.is_empty());
        }
        if dependents.is_empty() {
            return;
        }

        for connection in dependents.iter_mut() {
            connection.disconnect(self.resolver.domain()).await;
        }

        let mut table = self.table.lock().await;
        for connection in dependents {
            if connection.allow_deferral() {
                table.put_back(connection);
            } else {
                info!(
                    connection_id = %connection.identifier,
                    dependency = %identifier,
                    "Connection removed, its endpoint cannot return"
                );
                table.record_ids.remove(&connection.record_id);
            }
        }
    }

    pub async fn connections(&self) -> Vec<ConnectionStatus> {
        let table = self.table.lock().await;
        table
            .by_requester
            .values()
            .flatten()
            .map(|c| ConnectionStatus {
                record_id: c.record_id.clone(),
                connection_id: c.identifier.clone(),
                requester_id: c.requester_id.clone(),
                connected: c.connected,
                uses: c.uses.to_string(),
                provides: c.provides.to_string(),
            })
            .collect()
    }

    /// Persistent form of every tracked connection
    pub async fn records(&self) -> Vec<ConnectionRecord> {
        let table = self.table.lock().await;
        table
            .by_requester
            .values()
            .flatten()
            .map(ConnectionNode::to_record)
            .collect()
    }
}

#[async_trait]
impl ConnectionManager for DomainConnectionManager {
    async fn resolve_component(&self, identifier: &str) -> Option<ObjectRef> {
        self.resolver.resolve_component(identifier).await
    }

    async fn resolve_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        self.resolver.resolve_domain_object(kind, name).await
    }

    async fn resolve_find_by_naming_service(&self, name: &str) -> Option<ObjectRef> {
        self.resolver.resolve_naming_name(name).await
    }

    // Application-relative lookups have no meaning at domain scope
    async fn resolve_device_that_loaded(&self, _component_id: &str) -> Option<ObjectRef> {
        None
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
        self.resolver
            .domain()
            .decrement_event_channel_connections(name)
            .await;
    }
}
