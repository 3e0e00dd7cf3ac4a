//! Naming service port
//! Paths are `/`-separated with no leading slash, e.g. `REDHAWK_DEV/DevMgr_host/GPP_1`.

use crate::domain::ports::ObjectRef;
use crate::domain::NamingError;
use async_trait::async_trait;

#[async_trait]
pub trait NamingService: Send + Sync {
    async fn bind_new_context(&self, path: &str) -> Result<(), NamingError>;

    async fn bind(&self, path: &str, object: ObjectRef) -> Result<(), NamingError>;

    async fn rebind(&self, path: &str, object: ObjectRef) -> Result<(), NamingError>;

    async fn unbind(&self, path: &str) -> Result<(), NamingError>;

    async fn resolve(&self, path: &str) -> Result<ObjectRef, NamingError>;

    /// Remove a context together with every binding beneath it
    async fn destroy_context(&self, path: &str) -> Result<(), NamingError>;
}
