//! Charge point connection identity

use std::fmt;

use serde::{Deserialize, Serialize};

use super::OcppVersion;

/// Key identifying one charge-point connection.
///
/// The protocol version is the identity namespace: the same station id spoken
/// over two protocol generations yields two distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub protocol: OcppVersion,
    pub charge_point_id: String,
}

impl ClientIdentity {
    pub fn new(protocol: OcppVersion, charge_point_id: impl Into<String>) -> Self {
        Self {
            protocol,
            charge_point_id: charge_point_id.into(),
        }
    }

    pub fn v16(charge_point_id: impl Into<String>) -> Self {
        Self::new(OcppVersion::V16, charge_point_id)
    }

    pub fn v201(charge_point_id: impl Into<String>) -> Self {
        Self::new(OcppVersion::V201, charge_point_id)
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol.subprotocol(), self.charge_point_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_namespaced_by_protocol() {
        assert_ne!(ClientIdentity::v16("CP001"), ClientIdentity::v201("CP001"));
        assert_eq!(ClientIdentity::v16("CP001"), ClientIdentity::v16("CP001"));
    }

    #[test]
    fn display_includes_subprotocol() {
        assert_eq!(ClientIdentity::v201("CP-7").to_string(), "ocpp2.0.1/CP-7");
    }
}
