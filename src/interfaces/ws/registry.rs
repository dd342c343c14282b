//! Connection registry: live WebSocket connections per client identity

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::application::ports::{MessageTransport, TransportError};
use crate::domain::ClientIdentity;

/// An active WebSocket connection to a charge point
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection instance
    pub connection_id: u64,
    sender: mpsc::UnboundedSender<Message>,
    pub remote_addr: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

pub struct ConnectionRegistry {
    connections: DashMap<ClientIdentity, Connection>,
    next_connection_id: AtomicU64,
}

pub type SharedConnectionRegistry = Arc<ConnectionRegistry>;

fn close_message(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }))
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedConnectionRegistry {
        Arc::new(Self::new())
    }

    /// Register a connection for `client` and return its connection id.
    ///
    /// A connection already registered under the same identity is replaced
    /// and asked to close.
    pub fn register(
        &self,
        client: &ClientIdentity,
        sender: mpsc::UnboundedSender<Message>,
        remote_addr: Option<String>,
    ) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let connection = Connection {
            connection_id,
            sender,
            remote_addr,
            connected_at: now,
            last_activity: now,
        };

        if let Some(evicted) = self.connections.insert(client.clone(), connection) {
            warn!(
                charge_point_id = client.charge_point_id(),
                protocol = %client.protocol,
                evicted_connection = evicted.connection_id,
                connection_id,
                "Replacing existing connection"
            );
            evicted.send(close_message("Replaced by a newer connection"));
        } else {
            info!(
                charge_point_id = client.charge_point_id(),
                protocol = %client.protocol,
                connection_id,
                "Charge point connected"
            );
        }
        metrics::gauge!("ocpp_connected_charge_points").set(self.connections.len() as f64);
        connection_id
    }

    /// Remove the connection if it is still the current one for `client`.
    /// Returns `false` when it had already been replaced.
    pub fn unregister(&self, client: &ClientIdentity, connection_id: u64) -> bool {
        let removed = self
            .connections
            .remove_if(client, |_, conn| conn.connection_id == connection_id)
            .is_some();
        if removed {
            info!(
                charge_point_id = client.charge_point_id(),
                connection_id,
                "Charge point disconnected"
            );
            metrics::gauge!("ocpp_connected_charge_points").set(self.connections.len() as f64);
        } else {
            debug!(
                charge_point_id = client.charge_point_id(),
                connection_id,
                "Stale connection closed"
            );
        }
        removed
    }

    pub fn touch(&self, client: &ClientIdentity) {
        if let Some(mut conn) = self.connections.get_mut(client) {
            conn.last_activity = Utc::now();
        }
    }

    pub fn is_connected(&self, client: &ClientIdentity) -> bool {
        self.connections.contains_key(client)
    }

    pub fn connection_id(&self, client: &ClientIdentity) -> Option<u64> {
        self.connections.get(client).map(|conn| conn.connection_id)
    }

    pub fn connected(&self) -> Vec<ClientIdentity> {
        let mut clients: Vec<_> = self.connections.iter().map(|e| e.key().clone()).collect();
        clients.sort();
        clients
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Ask every connection to close.
    pub fn close_all(&self, reason: &'static str) {
        for entry in self.connections.iter() {
            debug!(charge_point_id = entry.key().charge_point_id(), "Closing connection");
            entry.send(close_message(reason));
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageTransport for ConnectionRegistry {
    async fn send(&self, client: &ClientIdentity, message: String) -> Result<(), TransportError> {
        let conn = self
            .connections
            .get(client)
            .ok_or_else(|| TransportError::NotConnected(client.clone()))?;
        if conn.send(Message::Text(message.into())) {
            Ok(())
        } else {
            Err(TransportError::Closed {
                client: client.clone(),
                reason: "connection writer has stopped".into(),
            })
        }
    }
}
