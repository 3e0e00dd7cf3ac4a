//! ProcessLauncher port
//! Interface for launching device and service processes

use crate::domain::value_objects::ChildExitStatus;
use crate::domain::DomainError;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub env_vars: Vec<(String, String)>,
}

/// Resolves when the launched process exits
pub type ProcessExitHandle =
    Pin<Box<dyn Future<Output = Result<ChildExitStatus, DomainError>> + Send>>;

pub struct LaunchResult {
    pub pid: u32,
    pub exit_handle: ProcessExitHandle,
}

impl std::fmt::Debug for LaunchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchResult").field("pid", &self.pid).finish()
    }
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, config: LaunchConfig) -> Result<LaunchResult, DomainError>;

    async fn signal(&self, pid: u32, signal: i32) -> Result<(), DomainError>;

    async fn is_running(&self, pid: u32) -> bool;
}
