//! In-Process Naming Service
//! Hierarchical name tree shared by every domain and device manager living in
//! the daemon. A name can only be bound inside an existing context.

use crate::domain::ports::{NamingService, ObjectRef};
use crate::domain::NamingError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

#[derive(Clone)]
enum Entry {
    Context,
    Object(ObjectRef),
}

#[derive(Default)]
pub struct InMemoryNamingService {
    entries: RwLock<BTreeMap<String, Entry>>,
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

impl InMemoryNamingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every object bound directly or indirectly beneath `path`
    pub async fn list(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", normalize(path));
        self.entries
            .read()
            .await
            .iter()
            .filter(|(name, entry)| name.starts_with(&prefix) && matches!(entry, Entry::Object(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn check_parent(
        entries: &BTreeMap<String, Entry>,
        path: &str,
    ) -> Result<(), NamingError> {
        match parent_of(path) {
            Some(parent) if !matches!(entries.get(parent), Some(Entry::Context)) => {
                Err(NamingError::NotFound(parent.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NamingService for InMemoryNamingService {
    async fn bind_new_context(&self, path: &str) -> Result<(), NamingError> {
        let path = normalize(path);
        let mut entries = self.entries.write().await;
        if entries.contains_key(path) {
            return Err(NamingError::AlreadyBound(path.to_string()));
        }
        Self::check_parent(&entries, path)?;
        entries.insert(path.to_string(), Entry::Context);
        debug!(context = %path, "Bound new naming context");
        Ok(())
    }

    async fn bind(&self, path: &str, object: ObjectRef) -> Result<(), NamingError> {
        let path = normalize(path);
        let mut entries = self.entries.write().await;
        if entries.contains_key(path) {
            return Err(NamingError::AlreadyBound(path.to_string()));
        }
        Self::check_parent(&entries, path)?;
        entries.insert(path.to_string(), Entry::Object(object));
        trace!(name = %path, "Bound object");
        Ok(())
    }

    async fn rebind(&self, path: &str, object: ObjectRef) -> Result<(), NamingError> {
        let path = normalize(path);
        let mut entries = self.entries.write().await;
        if matches!(entries.get(path), Some(Entry::Context)) {
            return Err(NamingError::AlreadyBound(path.to_string()));
        }
        Self::check_parent(&entries, path)?;
        entries.insert(path.to_string(), Entry::Object(object));
        trace!(name = %path, "Rebound object");
        Ok(())
    }

    async fn unbind(&self, path: &str) -> Result<(), NamingError> {
        let path = normalize(path);
        let mut entries = self.entries.write().await;
        match entries.get(path) {
            Some(Entry::Object(_)) => {
                entries.remove(path);
                trace!(name = %path, "Unbound object");
                Ok(())
            }
            _ => Err(NamingError::NotFound(path.to_string())),
        }
    }

    async fn resolve(&self, path: &str) -> Result<ObjectRef, NamingError> {
        let path = normalize(path);
        match self.entries.read().await.get(path) {
            Some(Entry::Object(object)) => Ok(object.clone()),
            _ => Err(NamingError::NotFound(path.to_string())),
        }
    }

    async fn destroy_context(&self, path: &str) -> Result<(), NamingError> {
        let path = normalize(path);
        let mut entries = self.entries.write().await;
        if !matches!(entries.get(path), Some(Entry::Context)) {
            return Err(NamingError::NotFound(path.to_string()));
        }
        let prefix = format!("{path}/");
        entries.retain(|name, _| name != path && !name.starts_with(&prefix));
        debug!(context = %path, "Destroyed naming context");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RemoteObject;
    use std::sync::Arc;

    struct Named(&'static str);

    impl RemoteObject for Named {
        fn ior(&self) -> String {
            self.0.to_string()
        }
    }

    fn object(ior: &'static str) -> ObjectRef {
        Arc::new(Named(ior))
    }

    #[tokio::test]
    async fn test_bind_requires_parent_context() {
        let naming = InMemoryNamingService::new();

        let result = naming.bind("REDHAWK_DEV/GPP_1", object("IOR:gpp")).await;
        assert_eq!(result, Err(NamingError::NotFound("REDHAWK_DEV".to_string())));

        naming.bind_new_context("REDHAWK_DEV").await.unwrap();
        naming.bind("REDHAWK_DEV/GPP_1", object("IOR:gpp")).await.unwrap();
        let resolved = naming.resolve("/REDHAWK_DEV/GPP_1").await.unwrap();
        assert_eq!(resolved.ior(), "IOR:gpp");
    }

    #[tokio::test]
    async fn test_bind_twice_fails_but_rebind_replaces() {
        let naming = InMemoryNamingService::new();
        naming.bind_new_context("d").await.unwrap();
        naming.bind("d/x", object("IOR:1")).await.unwrap();

        assert!(matches!(
            naming.bind("d/x", object("IOR:2")).await,
            Err(NamingError::AlreadyBound(_))
        ));
        naming.rebind("d/x", object("IOR:2")).await.unwrap();
        assert_eq!(naming.resolve("d/x").await.unwrap().ior(), "IOR:2");
    }

    #[tokio::test]
    async fn test_destroy_context_removes_subtree() {
        let naming = InMemoryNamingService::new();
        naming.bind_new_context("d").await.unwrap();
        naming.bind_new_context("d/node").await.unwrap();
        naming.bind("d/node/GPP_1", object("IOR:gpp")).await.unwrap();
        naming.bind("d/logger", object("IOR:log")).await.unwrap();

        naming.destroy_context("d/node").await.unwrap();

        assert_eq!(naming.list("d").await, vec!["d/logger".to_string()]);
        assert!(matches!(
            naming.destroy_context("d/node").await,
            Err(NamingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unbind_missing_name() {
        let naming = InMemoryNamingService::new();
        assert!(matches!(
            naming.unbind("d/none").await,
            Err(NamingError::NotFound(_))
        ));
    }
}
