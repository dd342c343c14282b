//! OCPP-J 2.0.1 CallError codes

use super::RpcErrorCode;

/// Error codes defined by OCPP-J 2.0.1 §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum V201ErrorCode {
    FormatViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

impl V201ErrorCode {
    pub const ALL: &'static [V201ErrorCode] = &[
        Self::FormatViolation,
        Self::GenericError,
        Self::InternalError,
        Self::MessageTypeNotSupported,
        Self::NotImplemented,
        Self::NotSupported,
        Self::OccurrenceConstraintViolation,
        Self::PropertyConstraintViolation,
        Self::ProtocolError,
        Self::RpcFrameworkError,
        Self::SecurityError,
        Self::TypeConstraintViolation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FormatViolation => "FormatViolation",
            Self::GenericError => "GenericError",
            Self::InternalError => "InternalError",
            Self::MessageTypeNotSupported => "MessageTypeNotSupported",
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::ProtocolError => "ProtocolError",
            Self::RpcFrameworkError => "RpcFrameworkError",
            Self::SecurityError => "SecurityError",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
        }
    }

    pub fn from_rpc(rpc: RpcErrorCode) -> Self {
        match rpc {
            RpcErrorCode::GenericError => Self::GenericError,
            RpcErrorCode::InternalError => Self::InternalError,
            RpcErrorCode::MessageTypeNotSupported => Self::MessageTypeNotSupported,
            RpcErrorCode::RpcFrameworkError => Self::RpcFrameworkError,
            RpcErrorCode::PayloadSyntaxError => Self::FormatViolation,
            RpcErrorCode::PayloadProtocolError => Self::ProtocolError,
            RpcErrorCode::PayloadPropertyConstraintViolation => Self::PropertyConstraintViolation,
            RpcErrorCode::PayloadOccurrenceConstraintViolation => {
                Self::OccurrenceConstraintViolation
            }
            RpcErrorCode::PayloadTypeConstraintViolation => Self::TypeConstraintViolation,
            RpcErrorCode::SecurityError => Self::SecurityError,
            RpcErrorCode::ActionNotImplemented => Self::NotImplemented,
            RpcErrorCode::ActionNotSupported => Self::NotSupported,
        }
    }

    pub fn to_rpc(self) -> RpcErrorCode {
        match self {
            Self::FormatViolation => RpcErrorCode::PayloadSyntaxError,
            Self::GenericError => RpcErrorCode::GenericError,
            Self::InternalError => RpcErrorCode::InternalError,
            Self::MessageTypeNotSupported => RpcErrorCode::MessageTypeNotSupported,
            Self::NotImplemented => RpcErrorCode::ActionNotImplemented,
            Self::NotSupported => RpcErrorCode::ActionNotSupported,
            Self::OccurrenceConstraintViolation => RpcErrorCode::PayloadOccurrenceConstraintViolation,
            Self::PropertyConstraintViolation => RpcErrorCode::PayloadPropertyConstraintViolation,
            Self::ProtocolError => RpcErrorCode::PayloadProtocolError,
            Self::RpcFrameworkError => RpcErrorCode::RpcFrameworkError,
            Self::SecurityError => RpcErrorCode::SecurityError,
            Self::TypeConstraintViolation => RpcErrorCode::PayloadTypeConstraintViolation,
        }
    }
}
