//! Version-agnostic RPC error taxonomy

use std::fmt;

/// RPC-level error classification used inside the central system.
///
/// Every protocol version maps each member onto one of its own wire codes
/// (see [`super::ErrorCodeResolver`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCode {
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    RpcFrameworkError,
    PayloadSyntaxError,
    PayloadProtocolError,
    PayloadPropertyConstraintViolation,
    PayloadOccurrenceConstraintViolation,
    PayloadTypeConstraintViolation,
    SecurityError,
    ActionNotImplemented,
    ActionNotSupported,
}

impl RpcErrorCode {
    pub const ALL: &'static [RpcErrorCode] = &[
        Self::GenericError,
        Self::InternalError,
        Self::MessageTypeNotSupported,
        Self::RpcFrameworkError,
        Self::PayloadSyntaxError,
        Self::PayloadProtocolError,
        Self::PayloadPropertyConstraintViolation,
        Self::PayloadOccurrenceConstraintViolation,
        Self::PayloadTypeConstraintViolation,
        Self::SecurityError,
        Self::ActionNotImplemented,
        Self::ActionNotSupported,
    ];
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
