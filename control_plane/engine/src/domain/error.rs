//! Domain-level errors
//! `DomainError` is the taxonomy visible at the control-plane boundary.
//! `RemoteError` describes a failed call on a remote object.

use std::time::Duration;
use thiserror::Error;

/// Failure raised by an outbound call on a remote object
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("object does not exist")]
    ObjectNotExist,

    #[error("communication failure: {0}")]
    CommFailure(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("port is occupied")]
    OccupiedPort,

    #[error("unknown port '{0}'")]
    UnknownPort(String),

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("partial configuration, rejected properties: {0:?}")]
    PartialConfiguration(Vec<String>),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("initialize failed: {0}")]
    InitializeError(String),

    #[error("release failed: {0}")]
    ReleaseError(String),

    #[error("remote call rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Failures that are retried with a bounded delay rather than surfaced
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient(_) | RemoteError::ObjectNotExist | RemoteError::CommFailure(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NamingError {
    #[error("name '{0}' is already bound")]
    AlreadyBound(String),

    #[error("name '{0}' not found")]
    NotFound(String),

    #[error("naming service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("store is not open")]
    NotOpen,

    #[error("store I/O failure: {0}")]
    Io(String),

    #[error("corrupt value for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error, Clone)]
pub enum DomainError {
    // Caller errors
    #[error("invalid object reference: {0}")]
    InvalidObjectReference(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    // Registration errors
    #[error("register error: {0}")]
    RegisterError(String),

    #[error("device manager '{0}' is not registered")]
    DeviceManagerNotRegistered(String),

    // Connection errors
    #[error("invalid connection '{id}': {reason}")]
    InvalidConnection { id: String, reason: String },

    // Allocation errors
    #[error("invalid allocation ids: [{}]", .0.join(", "))]
    InvalidAllocationId(Vec<String>),

    #[error("allocation error: {0}")]
    AllocationError(String),

    // Application errors
    #[error("application '{0}' is already installed")]
    ApplicationAlreadyInstalled(String),

    #[error("application '{0}' not found")]
    ApplicationNotFound(String),

    // Lookup errors
    #[error("lookup failed: {0}")]
    LookupError(String),

    #[error("invalid domain object type '{0}'")]
    InvalidObjectType(String),

    // Deployment errors
    #[error("invalid profile '{path}': {reason}")]
    InvalidProfile { path: String, reason: String },

    #[error("unsupported deployment: {0}")]
    UnsupportedDeployment(String),

    #[error("no implementation of '{0}' matches this host")]
    NoMatchingImplementation(String),

    #[error("launch failed for '{id}': {reason}")]
    LaunchFailed { id: String, reason: String },

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("operation aborted, shutdown in progress")]
    ShuttingDown,

    // Collaborator failures
    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl DomainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Remote(e) if e.is_transient())
    }

    pub fn invalid_connection(id: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::InvalidConnection {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
