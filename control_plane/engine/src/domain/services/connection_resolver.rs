//! Connection Resolver
//! Lookups shared by the application-scoped and domain-scoped connection managers

use crate::domain::ports::{ComponentLookup, DomainLookup, NamingService, ObjectRef};
use crate::domain::Result;
use std::sync::Arc;
use tracing::debug;

pub struct ConnectionResolver {
    domain: Arc<dyn DomainLookup>,
    components: Arc<dyn ComponentLookup>,
    naming: Arc<dyn NamingService>,
    naming_context: String,
}

impl ConnectionResolver {
    pub fn new(
        domain: Arc<dyn DomainLookup>,
        components: Arc<dyn ComponentLookup>,
        naming: Arc<dyn NamingService>,
        naming_context: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            components,
            naming,
            naming_context: naming_context.into(),
        }
    }

    pub fn naming_context(&self) -> &str {
        &self.naming_context
    }

    pub fn domain(&self) -> &dyn DomainLookup {
        self.domain.as_ref()
    }

    /// Components first, then device managers with the same instantiation id
    pub async fn resolve_component(&self, identifier: &str) -> Option<ObjectRef> {
        if let Some(component) = self
            .components
            .lookup_component_by_instantiation_id(identifier)
            .await
        {
            return Some(component);
        }
        self.components
            .lookup_device_manager_by_instantiation_id(identifier)
            .await
    }

    pub async fn resolve_domain_object(&self, kind: &str, name: &str) -> Result<Option<ObjectRef>> {
        self.domain.lookup_domain_object(kind, name).await
    }

    /// Names starting with `/` are absolute, anything else is relative to the naming context
    pub async fn resolve_naming_name(&self, name: &str) -> Option<ObjectRef> {
        match name.strip_prefix('/') {
            Some(absolute) => self.resolve_path(absolute).await,
            None => {
                self.resolve_path(&format!("{}/{}", self.naming_context, name))
                    .await
            }
        }
    }

    pub async fn resolve_path(&self, path: &str) -> Option<ObjectRef> {
        match self.naming.resolve(path).await {
            Ok(object) => Some(object),
            Err(e) => {
                debug!(path = %path, error = %e, "Naming lookup failed");
                None
            }
        }
    }
}
