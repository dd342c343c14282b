//! OCPP-J 1.6 CallError codes

use super::RpcErrorCode;

/// Error codes defined by OCPP-J 1.6 §4.2.3.
///
/// `OccurenceConstraintViolation` keeps the misspelling used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V16ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl V16ErrorCode {
    pub const ALL: &'static [V16ErrorCode] = &[
        Self::NotImplemented,
        Self::NotSupported,
        Self::InternalError,
        Self::ProtocolError,
        Self::SecurityError,
        Self::FormationViolation,
        Self::PropertyConstraintViolation,
        Self::OccurenceConstraintViolation,
        Self::TypeConstraintViolation,
        Self::GenericError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }

    pub fn from_rpc(rpc: RpcErrorCode) -> Self {
        match rpc {
            RpcErrorCode::GenericError => Self::GenericError,
            RpcErrorCode::InternalError => Self::InternalError,
            // 1.6 has no dedicated code for framing failures.
            RpcErrorCode::MessageTypeNotSupported
            | RpcErrorCode::RpcFrameworkError
            | RpcErrorCode::PayloadSyntaxError => Self::FormationViolation,
            RpcErrorCode::PayloadProtocolError => Self::ProtocolError,
            RpcErrorCode::PayloadPropertyConstraintViolation => Self::PropertyConstraintViolation,
            RpcErrorCode::PayloadOccurrenceConstraintViolation => {
                Self::OccurenceConstraintViolation
            }
            RpcErrorCode::PayloadTypeConstraintViolation => Self::TypeConstraintViolation,
            RpcErrorCode::SecurityError => Self::SecurityError,
            RpcErrorCode::ActionNotImplemented => Self::NotImplemented,
            RpcErrorCode::ActionNotSupported => Self::NotSupported,
        }
    }

    pub fn to_rpc(self) -> RpcErrorCode {
        match self {
            Self::NotImplemented => RpcErrorCode::ActionNotImplemented,
            Self::NotSupported => RpcErrorCode::ActionNotSupported,
            Self::InternalError => RpcErrorCode::InternalError,
            Self::ProtocolError => RpcErrorCode::PayloadProtocolError,
            Self::SecurityError => RpcErrorCode::SecurityError,
            Self::FormationViolation => RpcErrorCode::PayloadSyntaxError,
            Self::PropertyConstraintViolation => RpcErrorCode::PayloadPropertyConstraintViolation,
            Self::OccurenceConstraintViolation => RpcErrorCode::PayloadOccurrenceConstraintViolation,
            Self::TypeConstraintViolation => RpcErrorCode::PayloadTypeConstraintViolation,
            Self::GenericError => RpcErrorCode::GenericError,
        }
    }
}
