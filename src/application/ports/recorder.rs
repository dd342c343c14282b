//! In-memory transport for dispatch tests

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MessageTransport, TransportError};
use crate::domain::ClientIdentity;

/// Records every frame sent and forwards it to a channel so tests can
/// play the charge point side.
pub struct RecordingTransport {
    sent: Mutex<Vec<(ClientIdentity, String)>>,
    outbox: mpsc::UnboundedSender<(ClientIdentity, String)>,
    disconnected: Mutex<Vec<ClientIdentity>>,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ClientIdentity, String)>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let transport = Self {
            sent: Mutex::new(Vec::new()),
            outbox,
            disconnected: Mutex::new(Vec::new()),
        };
        (transport, rx)
    }

    pub fn disconnect(&self, client: &ClientIdentity) {
        self.disconnected.lock().unwrap().push(client.clone());
    }

    pub fn sent(&self) -> Vec<(ClientIdentity, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, client: &ClientIdentity, message: String) -> Result<(), TransportError> {
        if self.disconnected.lock().unwrap().contains(client) {
            return Err(TransportError::NotConnected(client.clone()));
        }
        self.sent.lock().unwrap().push((client.clone(), message.clone()));
        let _ = self.outbox.send((client.clone(), message));
        Ok(())
    }
}
