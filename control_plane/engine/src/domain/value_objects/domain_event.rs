//! Object added/removed notifications published on the outgoing domain channel

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of object an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceCategory {
    DeviceManager,
    Device,
    ApplicationFactory,
    Application,
    Service,
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceCategory::DeviceManager => "DEVICE_MANAGER",
            SourceCategory::Device => "DEVICE",
            SourceCategory::ApplicationFactory => "APPLICATION_FACTORY",
            SourceCategory::Application => "APPLICATION",
            SourceCategory::Service => "SERVICE",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ObjectAdded {
        producer_id: String,
        source_id: String,
        source_name: String,
        category: SourceCategory,
        /// Reference to the added object, when it has one
        source_ior: Option<String>,
    },
    ObjectRemoved {
        producer_id: String,
        source_id: String,
        source_name: String,
        category: SourceCategory,
    },
}

impl DomainEvent {
    pub fn added(
        producer_id: &str,
        source_id: &str,
        source_name: &str,
        category: SourceCategory,
        source_ior: Option<String>,
    ) -> Self {
        DomainEvent::ObjectAdded {
            producer_id: producer_id.to_string(),
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            category,
            source_ior,
        }
    }

    pub fn removed(
        producer_id: &str,
        source_id: &str,
        source_name: &str,
        category: SourceCategory,
    ) -> Self {
        DomainEvent::ObjectRemoved {
            producer_id: producer_id.to_string(),
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            category,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            DomainEvent::ObjectAdded { source_id, .. }
            | DomainEvent::ObjectRemoved { source_id, .. } => source_id,
        }
    }

    pub fn category(&self) -> SourceCategory {
        match self {
            DomainEvent::ObjectAdded { category, .. }
            | DomainEvent::ObjectRemoved { category, .. } => *category,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, DomainEvent::ObjectAdded { .. })
    }
}
