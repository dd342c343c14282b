//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport protocol framing.
//! This framing is **identical** across OCPP 1.6 and 2.0.1:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::Value;
use thiserror::Error;

use crate::application::errors::RpcErrorCode;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = value.as_array().ok_or(FrameError::NotAnArray)?;

        if arr.is_empty() {
            return Err(FrameError::EmptyArray);
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(arr),
            _ => Err(FrameError::UnknownMessageType(msg_type)),
        }
    }

    /// Unique id of a frame that failed to parse, when that frame may be
    /// answered with a CallError. Malformed CallResult and CallError frames
    /// are never answered.
    pub fn recover_unique_id(text: &str) -> Option<String> {
        let value: Value = serde_json::from_str(text).ok()?;
        let arr = value.as_array()?;
        if matches!(
            arr.first().and_then(Value::as_u64),
            Some(MSG_TYPE_CALL_RESULT | MSG_TYPE_CALL_ERROR)
        ) {
            return None;
        }
        arr.get(1)?.as_str().map(String::from)
    }

    fn unique_id_at(arr: &[Value]) -> Result<String, FrameError> {
        arr[1]
            .as_str()
            .map(String::from)
            .ok_or(FrameError::FieldTypeMismatch("uniqueId must be a string"))
    }

    fn parse_call(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        let unique_id = Self::unique_id_at(arr)?;
        let action = arr[2]
            .as_str()
            .ok_or(FrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        let payload = arr[3].clone();

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 2 {
            return Err(FrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }

        let unique_id = Self::unique_id_at(arr)?;
        // A missing payload is read as "no payload", same as `null` or `{}`.
        let payload = arr.get(2).cloned().unwrap_or(Value::Null);

        Ok(Self::CallResult { unique_id, payload })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 3 {
            return Err(FrameError::MissingFields {
                expected: 5,
                got: arr.len(),
            });
        }

        let unique_id = Self::unique_id_at(arr)?;
        let error_code = arr[2]
            .as_str()
            .ok_or(FrameError::FieldTypeMismatch("errorCode must be a string"))?
            .to_string();
        let error_description = arr
            .get(3)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let error_details = arr
            .get(4)
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        arr.to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

impl FrameError {
    /// RPC-level classification of the framing failure.
    pub fn rpc_error(&self) -> RpcErrorCode {
        match self {
            Self::InvalidJson(_) => RpcErrorCode::PayloadSyntaxError,
            Self::UnknownMessageType(_) => RpcErrorCode::MessageTypeNotSupported,
            _ => RpcErrorCode::RpcFrameworkError,
        }
    }
}
