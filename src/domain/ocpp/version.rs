//! OCPP protocol version
//!
//! Defines the protocol generations the central system speaks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0.1
    V201,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier for this OCPP version.
    ///
    /// Used in the `Sec-WebSocket-Protocol` header during handshake.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
        }
    }

    /// Parse an OCPP version from a WebSocket subprotocol string.
    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.6" => Some(Self::V16),
            "ocpp2.0.1" => Some(Self::V201),
            _ => None,
        }
    }

    /// All supported OCPP versions, ordered from newest to oldest.
    pub const ALL: &'static [OcppVersion] = &[Self::V201, Self::V16];

    /// Human-readable version string.
    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V201 => "2.0.1",
        }
    }

    /// `<major>:<year>:<minor>` segment of the schema URNs for this version.
    pub fn schema_release(&self) -> &'static str {
        match self {
            Self::V16 => "1:2015:10",
            Self::V201 => "2:2020:3",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprotocol_roundtrip() {
        for version in OcppVersion::ALL {
            assert_eq!(
                OcppVersion::from_subprotocol(version.subprotocol()),
                Some(*version)
            );
        }
        assert_eq!(OcppVersion::from_subprotocol(" ocpp1.6 "), Some(OcppVersion::V16));
        assert_eq!(OcppVersion::from_subprotocol("ocpp2.1"), None);
    }

    #[test]
    fn display_uses_version_string() {
        assert_eq!(OcppVersion::V201.to_string(), "OCPP 2.0.1");
    }
}
