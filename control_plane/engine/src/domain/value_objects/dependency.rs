//! Kinds of entity a connection can depend on

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// A component or device, by instantiation identifier
    Component,
    /// A service, by registered name
    ServiceName,
    /// An application, by identifier
    Application,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyType::Component => write!(f, "component"),
            DependencyType::ServiceName => write!(f, "service"),
            DependencyType::Application => write!(f, "application"),
        }
    }
}
