//! Application ports
//!
//! Outbound boundary between the central system and whatever carries
//! OCPP-J text to charge points.

#[cfg(test)]
pub mod recorder;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ClientIdentity;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Charge point not connected: {0}")]
    NotConnected(ClientIdentity),

    #[error("Connection to {client} closed: {reason}")]
    Closed {
        client: ClientIdentity,
        reason: String,
    },
}

/// Delivers serialized OCPP-J frames to a connected charge point.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, client: &ClientIdentity, message: String) -> Result<(), TransportError>;
}
