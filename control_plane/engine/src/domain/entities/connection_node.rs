//! Connection node
//! Pairs a uses endpoint with a provides endpoint and owns the connect/disconnect protocol.

use crate::domain::constants::{CONNECT_PORT_TIMEOUT, DISCONNECT_PORT_TIMEOUT};
use crate::domain::entities::connection_descriptor::ConnectionDescriptor;
use crate::domain::entities::endpoint::{Endpoint, EndpointRecord};
use crate::domain::ports::{ConnectionManager, DomainLookup, ObjectBroker};
use crate::domain::value_objects::DependencyType;
use crate::domain::{DomainError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConnectionNode {
    pub uses: Endpoint,
    pub provides: Endpoint,
    pub identifier: String,
    pub requester_id: String,
    /// Domain-unique id assigned when the connection is tracked domain-wide
    pub record_id: String,
    pub connected: bool,
}

impl ConnectionNode {
    pub fn new(
        uses: Endpoint,
        provides: Endpoint,
        identifier: impl Into<String>,
        requester_id: impl Into<String>,
    ) -> Self {
        let mut identifier = identifier.into();
        if identifier.is_empty() {
            identifier = Uuid::new_v4().to_string();
        }
        Self {
            uses,
            provides,
            identifier,
            requester_id: requester_id.into(),
            record_id: String::new(),
            connected: false,
        }
    }

    pub fn parse(descriptor: &ConnectionDescriptor, requester_id: &str) -> Result<Self> {
        if descriptor.uses.port_name.is_empty() {
            return Err(DomainError::invalid_connection(
                &descriptor.id,
                "uses port has no name",
            ));
        }
        Ok(Self::new(
            Endpoint::from_uses(&descriptor.uses),
            Endpoint::from_provides(&descriptor.provides),
            descriptor.id.clone(),
            requester_id,
        ))
    }

    /// Establish the connection.
    ///
    /// Returns `Ok(false)` when a side is missing and the connection may wait for it.
    pub async fn connect(&mut self, manager: &dyn ConnectionManager) -> Result<bool> {
        if self.connected {
            return Ok(true);
        }

        let Some(uses) = self.uses.resolve(manager).await else {
            return self.unavailable("uses");
        };
        let Some(provides) = self.provides.resolve(manager).await else {
            return self.unavailable("provides");
        };

        let Some(port) = uses.as_uses_port() else {
            self.abandon(manager).await;
            return Err(DomainError::invalid_connection(
                &self.identifier,
                format!("{} is not a uses port", self.uses),
            ));
        };

        let failure = match tokio::time::timeout(
            CONNECT_PORT_TIMEOUT,
            port.connect_port(provides, &self.identifier),
        )
        .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("connectPort failed: {e}")),
            Err(_) => Some("connectPort timed out".to_string()),
        };
        if let Some(reason) = failure {
            self.abandon(manager).await;
            return Err(DomainError::invalid_connection(&self.identifier, reason));
        }

        info!(
            connection_id = %self.identifier,
            uses = %self.uses,
            provides = %self.provides,
            "Connection established"
        );
        self.connected = true;
        Ok(true)
    }

    /// Drop both resolved sides after a failed attempt, returning any
    /// event channel count the provides side took
    async fn abandon(&mut self, manager: &dyn ConnectionManager) {
        if self.provides.is_resolved() {
            if let Some(channel) = self.provides.event_channel_name().map(str::to_string) {
                manager.release_event_channel(&channel).await;
            }
        }
        self.uses.release();
        self.provides.release();
    }

    fn unavailable(&self, side: &str) -> Result<bool> {
        if self.allow_deferral() {
            debug!(
                connection_id = %self.identifier,
                side = side,
                "Connection endpoint unavailable, deferring"
            );
            Ok(false)
        } else {
            Err(DomainError::invalid_connection(
                &self.identifier,
                format!("{side} endpoint is unavailable"),
            ))
        }
    }

    /// Tear the connection down. Safe to call repeatedly.
    pub async fn disconnect(&mut self, lookup: &dyn DomainLookup) {
        if !self.connected {
            return;
        }
        self.connected = false;

        let uses = self.uses.cached().cloned();
        self.uses.release();
        self.provides.release();

        if let Some(port) = uses.as_ref().and_then(|u| u.as_uses_port()) {
            match tokio::time::timeout(DISCONNECT_PORT_TIMEOUT, port.disconnect_port(&self.identifier))
                .await
            {
                Ok(Ok(())) => {
                    debug!(connection_id = %self.identifier, "Port disconnected");
                }
                Ok(Err(e)) => {
                    warn!(
                        connection_id = %self.identifier,
                        error = %e,
                        "Unable to disconnect port"
                    );
                }
                Err(_) => {
                    warn!(
                        connection_id = %self.identifier,
                        "Timed out disconnecting port"
                    );
                }
            }
        }

        if let Some(channel) = self.provides.event_channel_name() {
            lookup.decrement_event_channel_connections(channel).await;
        }
    }

    pub fn allow_deferral(&self) -> bool {
        self.uses.allow_deferral() && self.provides.allow_deferral()
    }

    pub fn check_dependency(&self, kind: DependencyType, identifier: &str) -> bool {
        self.uses.check_dependency(kind, identifier)
            || self.provides.check_dependency(kind, identifier)
    }

    pub fn to_record(&self) -> ConnectionRecord {
        ConnectionRecord {
            uses: self.uses.to_record(),
            provides: self.provides.to_record(),
            identifier: self.identifier.clone(),
            requester_id: self.requester_id.clone(),
            record_id: self.record_id.clone(),
            connected: self.connected,
        }
    }

    pub fn from_record(record: &ConnectionRecord, broker: &dyn ObjectBroker) -> Option<Self> {
        Some(Self {
            uses: Endpoint::from_record(&record.uses, broker)?,
            provides: Endpoint::from_record(&record.provides, broker)?,
            identifier: record.identifier.clone(),
            requester_id: record.requester_id.clone(),
            record_id: record.record_id.clone(),
            connected: record.connected,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub uses: EndpointRecord,
    pub provides: EndpointRecord,
    pub identifier: String,
    pub requester_id: String,
    #[serde(default)]
    pub record_id: String,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock_objects::{MockComponent, MockConnectionManager};

    fn node(uses: Endpoint, provides: Endpoint) -> ConnectionNode {
        ConnectionNode::new(uses, provides, "conn_1", "DCE:node-1")
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let manager = MockConnectionManager::new();
        let source = MockComponent::with_ports("DCE:source", &["out"]);
        let sink = MockComponent::with_ports("DCE:sink", &["in"]);
        manager.add_component("DCE:source", source.clone());
        manager.add_component("DCE:sink", sink.clone());

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::component("DCE:sink").port("in"),
        );

        assert!(conn.connect(&manager).await.unwrap());
        assert!(conn.connected);
        assert_eq!(source.port("out").connections(), vec!["conn_1".to_string()]);

        conn.disconnect(&manager).await;
        assert!(!conn.connected);
        assert!(!conn.uses.is_resolved());
        assert!(!conn.provides.is_resolved());
        assert!(source.port("out").connections().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_a_no_op() {
        let manager = MockConnectionManager::new();
        let source = MockComponent::with_ports("DCE:source", &["out"]);
        manager.add_component("DCE:source", source.clone());
        manager.add_component("DCE:sink", MockComponent::new("DCE:sink"));

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::component("DCE:sink"),
        );
        conn.connect(&manager).await.unwrap();

        conn.disconnect(&manager).await;
        conn.disconnect(&manager).await;

        assert!(!conn.connected);
        assert_eq!(source.port("out").disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_deferrable_side_is_deferred() {
        let manager = MockConnectionManager::new();
        manager.add_component("DCE:source", MockComponent::with_ports("DCE:source", &["out"]));

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::service("logger"),
        );

        assert!(!conn.connect(&manager).await.unwrap());
        assert!(!conn.connected);
    }

    #[tokio::test]
    async fn test_missing_application_side_is_an_invalid_connection() {
        let manager = MockConnectionManager::new();
        manager.add_component("DCE:source", MockComponent::with_ports("DCE:source", &["out"]));

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::application("app-1"),
        );

        match conn.connect(&manager).await {
            Err(DomainError::InvalidConnection { id, reason }) => {
                assert_eq!(id, "conn_1");
                assert!(reason.contains("provides"));
            }
            other => panic!("expected InvalidConnection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_occupied_port_is_an_invalid_connection() {
        let manager = MockConnectionManager::new();
        let source = MockComponent::with_ports("DCE:source", &["out"]);
        source.port("out").set_occupied(true);
        manager.add_component("DCE:source", source);
        manager.add_component("DCE:sink", MockComponent::new("DCE:sink"));

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::component("DCE:sink"),
        );

        assert!(matches!(
            conn.connect(&manager).await,
            Err(DomainError::InvalidConnection { .. })
        ));
        assert!(!conn.connected);
    }

    #[tokio::test]
    async fn test_event_channel_count_released_on_disconnect() {
        let manager = MockConnectionManager::new();
        manager.add_component("DCE:source", MockComponent::with_ports("DCE:source", &["out"]));
        manager.add_event_channel("alerts");

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::event_channel("alerts"),
        );
        conn.connect(&manager).await.unwrap();
        assert_eq!(manager.event_channel_count("alerts"), 1);

        conn.disconnect(&manager).await;
        assert_eq!(manager.event_channel_count("alerts"), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_gives_back_event_channel_count() {
        let manager = MockConnectionManager::new();
        let source = MockComponent::with_ports("DCE:source", &["out"]);
        source.port("out").set_occupied(true);
        manager.add_component("DCE:source", source);
        manager.add_event_channel("alerts");

        let mut conn = node(
            Endpoint::component("DCE:source").port("out"),
            Endpoint::event_channel("alerts"),
        );

        assert!(conn.connect(&manager).await.is_err());
        assert_eq!(manager.event_channel_count("alerts"), 0);
        assert!(!conn.uses.is_resolved());
        assert!(!conn.provides.is_resolved());
    }

    #[test]
    fn test_empty_identifier_is_generated() {
        let conn = ConnectionNode::new(
            Endpoint::component("a").port("out"),
            Endpoint::component("b"),
            "",
            "req",
        );
        assert!(Uuid::parse_str(&conn.identifier).is_ok());
    }
}
