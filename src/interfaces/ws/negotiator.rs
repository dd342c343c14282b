//! OCPP protocol version negotiation
//!
//! During the WebSocket handshake the charge point advertises which OCPP
//! sub-protocols it supports via the `Sec-WebSocket-Protocol` header.
//! The negotiator picks the best mutually-supported version.

use crate::domain::OcppVersion;

/// Negotiates the OCPP version during WebSocket handshake.
pub struct ProtocolNegotiator {
    /// Versions the central system supports, in preference order.
    supported_versions: Vec<OcppVersion>,
}

impl ProtocolNegotiator {
    pub fn new(supported_versions: Vec<OcppVersion>) -> Self {
        Self { supported_versions }
    }

    /// Returns the most preferred version the charge point also offers.
    pub fn negotiate(&self, requested_protocols: &str) -> Option<OcppVersion> {
        let requested: Vec<OcppVersion> = requested_protocols
            .split(',')
            .filter_map(OcppVersion::from_subprotocol)
            .collect();

        self.supported_versions
            .iter()
            .find(|version| requested.contains(version))
            .copied()
    }

    /// Subprotocols to advertise, for logging.
    pub fn supported_subprotocols(&self) -> Vec<&'static str> {
        self.supported_versions
            .iter()
            .map(|v| v.subprotocol())
            .collect()
    }
}

impl Default for ProtocolNegotiator {
    /// Every version, newest first.
    fn default() -> Self {
        Self::new(OcppVersion::ALL.to_vec())
    }
}
