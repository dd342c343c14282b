//! WebSocket interface
//!
//! - `ocpp_server`: OCPP-J WebSocket server (multi-version)
//! - `negotiator`: subprotocol negotiation
//! - `registry`: live connections, also the central system's message transport

pub mod negotiator;
pub mod ocpp_server;
pub mod registry;

pub use negotiator::ProtocolNegotiator;
pub use ocpp_server::{OcppServer, ServerError};
pub use registry::{ConnectionRegistry, SharedConnectionRegistry};
