//! Administrative and usage states

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a DeviceManager with respect to its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminState {
    #[default]
    Constructing,
    Registering,
    Registered,
    ShuttingDown,
    Shutdown,
}

impl AdminState {
    pub fn is_terminating(&self) -> bool {
        matches!(self, AdminState::ShuttingDown | AdminState::Shutdown)
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdminState::Constructing => "constructing",
            AdminState::Registering => "registering",
            AdminState::Registered => "registered",
            AdminState::ShuttingDown => "shutting-down",
            AdminState::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

/// Device usage as reported by the device itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UsageState {
    #[default]
    Idle,
    Active,
    Busy,
}
