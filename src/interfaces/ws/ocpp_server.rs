//! OCPP WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`.
//! The negotiated subprotocol decides which protocol version the
//! connection speaks for its whole lifetime.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::negotiator::ProtocolNegotiator;
use super::registry::SharedConnectionRegistry;
use crate::application::dispatch::CentralSystem;
use crate::domain::ClientIdentity;
use crate::support::shutdown::ShutdownSignal;

/// How long a closing connection gets to flush its close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// OCPP WebSocket Server
pub struct OcppServer {
    listener: TcpListener,
    central: Arc<CentralSystem>,
    registry: SharedConnectionRegistry,
    negotiator: Arc<ProtocolNegotiator>,
}

impl OcppServer {
    /// Bind the listening socket. `registry` must be the transport the
    /// central system sends through.
    pub async fn bind(
        addr: &str,
        central: Arc<CentralSystem>,
        registry: SharedConnectionRegistry,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            central,
            registry,
            negotiator: Arc::new(ProtocolNegotiator::default()),
        })
    }

    pub fn with_negotiator(mut self, negotiator: ProtocolNegotiator) -> Self {
        self.negotiator = Arc::new(negotiator);
        self
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accept connections until `shutdown` fires, then close every
    /// connection.
    pub async fn run(self, shutdown: ShutdownSignal) {
        if let Some(addr) = self.local_addr() {
            info!(
                %addr,
                subprotocols = ?self.negotiator.supported_subprotocols(),
                "OCPP central system listening on ws://{}/ocpp/{{charge_point_id}}",
                addr
            );
        }

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr, shutdown.clone()),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!(connections = self.registry.count(), "WebSocket server shutting down");
                    self.registry.close_all("Server shutting down");
                    break;
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, shutdown: ShutdownSignal) {
        let central = self.central.clone();
        let registry = self.registry.clone();
        let negotiator = self.negotiator.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, central, registry, negotiator, shutdown).await {
                warn!(%addr, error = %e, "Connection failed");
            }
        });
    }
}

/// Charge point id from a `/ocpp/{charge_point_id}` request path.
fn extract_charge_point_id(path: &str) -> Option<String> {
    let id = path.trim_start_matches('/').strip_prefix("ocpp/")?;
    let id = id.trim_end_matches('/');
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id.to_string())
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = status;
    response
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    central: Arc<CentralSystem>,
    registry: SharedConnectionRegistry,
    negotiator: Arc<ProtocolNegotiator>,
    shutdown: ShutdownSignal,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    debug!(%addr, "New TCP connection");

    let mut accepted: Option<ClientIdentity> = None;
    let callback = |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let path = req.uri().path();
        let charge_point_id = extract_charge_point_id(path).ok_or_else(|| {
            warn!(%addr, path, "Handshake rejected: no charge point id in path");
            reject(StatusCode::NOT_FOUND, format!("Expected /ocpp/{{charge_point_id}}, got {}", path))
        })?;

        let requested = req
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let version = negotiator.negotiate(requested).ok_or_else(|| {
            warn!(
                %addr,
                charge_point_id = charge_point_id.as_str(),
                requested,
                "Handshake rejected: no supported subprotocol"
            );
            reject(
                StatusCode::BAD_REQUEST,
                format!("Supported subprotocols: {}", negotiator.supported_subprotocols().join(", ")),
            )
        })?;

        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(version.subprotocol()));
        accepted = Some(ClientIdentity::new(version, charge_point_id));
        Ok(response)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let Some(client) = accepted else {
        return Ok(());
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection_id = registry.register(&client, tx.clone(), Some(addr.to_string()));

    // Outgoing frames, including the close frame that ends the connection
    let send_client = client.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = ws_sender.send(message).await {
                warn!(charge_point_id = send_client.charge_point_id(), error = %e, "Send failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let recv_client = client.clone();
    let recv_central = central.clone();
    let recv_registry = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = recv_client.charge_point_id(), frame = text.as_str(), "<-");
                    recv_registry.touch(&recv_client);
                    if let Some(reply) = recv_central.handle_text(&recv_client, &text) {
                        debug!(charge_point_id = recv_client.charge_point_id(), frame = reply.as_str(), "->");
                        if tx.send(Message::Text(reply.into())).is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(charge_point_id = recv_client.charge_point_id(), ?frame, "Close frame received");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    warn!(
                        charge_point_id = recv_client.charge_point_id(),
                        bytes = data.len(),
                        "Binary frame ignored"
                    );
                }
                Ok(_) => recv_registry.touch(&recv_client),
                Err(e) => {
                    warn!(charge_point_id = recv_client.charge_point_id(), error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
        _ = shutdown.notified().wait() => {
            let _ = tokio::time::timeout(CLOSE_GRACE, &mut send_task).await;
        }
    }
    recv_task.abort();
    send_task.abort();

    if registry.unregister(&client, connection_id) {
        central.client_disconnected(&client);
    }
    Ok(())
}
