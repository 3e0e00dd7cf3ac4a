//! Application connection manager
//! Resolves the connections of one application while it is being deployed.
//! Names are looked up in the application's naming context and then in the
//! domain context above it.

use crate::domain::entities::{ConnectionDescriptor, ConnectionNode};
use crate::domain::ports::{
    ComponentLookup, ConnectionManager, DeviceLookup, DomainLookup, NamingService, ObjectRef,
};
use crate::domain::services::connection_resolver::ConnectionResolver;
use crate::domain::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AppConnectionManager {
    resolver: ConnectionResolver,
    devices: Arc<dyn DeviceLookup>,
    connections: Vec<ConnectionNode>,
}

impl AppConnectionManager {
    pub fn new(
        domain: Arc<dyn DomainLookup>,
        components: Arc<dyn ComponentLookup>,
        devices: Arc<dyn DeviceLookup>,
        naming: Arc<dyn NamingService>,
        naming_context: impl Into<String>,
    ) -> Self {
        Self {
            resolver: ConnectionResolver::new(domain, components, naming, naming_context),
            devices,
            connections: Vec::new(),
        }
    }

    /// Parse and establish one connection.
    ///
    /// Returns `Ok(false)` when an endpoint is not available yet; the
    /// connection is then not kept.
    pub async fn resolve_connection(&mut self, descriptor: &ConnectionDescriptor) -> Result<bool> {
        let mut node = ConnectionNode::parse(descriptor, self.resolver.naming_context())?;
        let connected = node.connect(&*self).await?;
        if connected {
            self.connections.push(node);
        } else {
            debug!(connection_id = %node.identifier, "Application connection not established");
        }
        Ok(connected)
    }

    pub fn connections(&self) -> &[ConnectionNode] {
        &self.connections
    }

    /// Hand the established connections to the application record
    pub fn take_connections(&mut self) -> Vec<ConnectionNode> {
        std::mem::take(&mut self.connections)
    }

    /// Break every connection, most recent first
    pub async fn disconnect_all(&mut self) {
        let mut connections = std::mem::take(&mut self.connections);
        for connection in connections.iter_mut().rev() {
            connection.disconnect(self.resolver.domain()).await;
        }
        info!(
            naming_context = %self.resolver.naming_context(),
            count = connections.len(),
            "Application connections released"
        );
    }

    /// `<domain>/<name>` for an application context `<domain>/<app>`
    fn domain_scoped(&self, name: &str) -> Option<String> {
        let context = self.resolver.naming_context();
        context
            .find('/')
            .map(|slash| format!("{}{}", &context[..=slash], name))
    }
}

#[async_trait]
impl ConnectionManager for AppConnectionManager {
    async fn resolve_component(&self, identifier: &str) -> Option<ObjectRef> {
        self.resolver.resolve_component(identifier).await
    }

    async fn resolve_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        self.resolver.resolve_domain_object(kind, name).await
    }

    async fn resolve_find_by_naming_service(&self, name: &str) -> Option<ObjectRef> {
        if let Some(object) = self.resolver.resolve_naming_name(name).await {
            return Some(object);
        }
        if name.starts_with('/') {
            return None;
        }
        let path = self.domain_scoped(name)?;
        self.resolver.resolve_path(&path).await
    }

    async fn resolve_device_that_loaded(&self, component_id: &str) -> Option<ObjectRef> {
        self.devices
            .lookup_device_that_loaded_component(component_id)
            .await
    }

    async fn resolve_device_used_by_component(
        &self,
        component_id: &str,
        uses_id: &str,
    ) -> Option<ObjectRef> {
        self.devices
            .lookup_device_used_by_component(component_id, uses_id)
            .await
    }

    async fn resolve_device_used_by_application(&self, uses_id: &str) -> Option<ObjectRef> {
        self.devices.lookup_device_used_by_application(uses_id).await
    }
    async fn release_event_channel(&self, name: &str) {
        self.resolver
            .domain()
            .decrement_event_channel_connections(name)
            .await;
    }
}
