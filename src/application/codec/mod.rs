//! Action payload codec
//!
//! Maps OCPP-J payloads onto the `rust_ocpp` message types registered for
//! a protocol version and validates them against the action's JSON schema,
//! in both directions.

pub mod catalog;
pub mod schema;
mod v16;
mod v201;

use std::any::{type_name, TypeId};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

pub use catalog::{ActionCatalog, CatalogError, PayloadDescriptor};
pub use schema::{Keyword, Violation};

use crate::application::errors::RpcErrorCode;
use crate::domain::{Action, Direction, OcppVersion};

#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Action {action} is not supported by {version}")]
    UnsupportedAction {
        version: OcppVersion,
        action: String,
        /// The name is a known action, just not one this version carries.
        known: bool,
    },

    #[error("{action}{} payload failed validation: {}", .direction.suffix(), describe(.violations, .mapping))]
    SchemaValidation {
        action: Action,
        direction: Direction,
        payload: Value,
        violations: Vec<Violation>,
        /// Diagnostic from mapping the payload onto its Rust type
        mapping: Option<String>,
    },

    #[error("{action}{} is registered as {expected}, not {found}", .direction.suffix())]
    TypeMismatch {
        action: Action,
        direction: Direction,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Failed to serialize {action}: {message}")]
    Serialization { action: Action, message: String },
}

fn describe(violations: &[Violation], mapping: &Option<String>) -> String {
    let mut parts: Vec<String> = violations.iter().map(ToString::to_string).collect();
    if let Some(mapping) = mapping {
        parts.push(mapping.clone());
    }
    parts.join("; ")
}

impl CodecError {
    /// Generic classification used when answering a Call with a CallError.
    pub fn rpc_error(&self) -> RpcErrorCode {
        match self {
            Self::UnsupportedAction { known: false, .. } => RpcErrorCode::ActionNotImplemented,
            Self::UnsupportedAction { known: true, .. } => RpcErrorCode::ActionNotSupported,
            Self::SchemaValidation { violations, .. } => match violations.first() {
                Some(v) => match v.keyword {
                    Keyword::Required | Keyword::MinItems | Keyword::MaxItems => {
                        RpcErrorCode::PayloadOccurrenceConstraintViolation
                    }
                    Keyword::Type => RpcErrorCode::PayloadTypeConstraintViolation,
                    _ => RpcErrorCode::PayloadPropertyConstraintViolation,
                },
                None => RpcErrorCode::PayloadTypeConstraintViolation,
            },
            Self::TypeMismatch { .. } | Self::Serialization { .. } => RpcErrorCode::InternalError,
        }
    }

    /// `errorDetails` object for a CallError frame
    pub fn details(&self) -> Value {
        match self {
            Self::SchemaValidation { violations, .. } if !violations.is_empty() => json!({
                "violations": violations
                    .iter()
                    .map(|v| json!({
                        "pointer": v.pointer,
                        "keyword": v.keyword.name(),
                        "message": v.message,
                    }))
                    .collect::<Vec<_>>()
            }),
            _ => json!({}),
        }
    }
}

/// Codec bound to one protocol version's catalog
#[derive(Debug, Clone)]
pub struct ActionPayloadCodec {
    catalog: Arc<ActionCatalog>,
}

impl ActionPayloadCodec {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn version(&self) -> OcppVersion {
        self.catalog.version()
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Resolve a wire action name against this version's catalog.
    pub fn resolve(&self, name: &str) -> Result<Action, CodecError> {
        let action: Action = name.parse().map_err(|_| CodecError::UnsupportedAction {
            version: self.version(),
            action: name.to_string(),
            known: false,
        })?;

        if self.catalog.supports(action) {
            Ok(action)
        } else {
            Err(CodecError::UnsupportedAction {
                version: self.version(),
                action: name.to_string(),
                known: true,
            })
        }
    }

    /// Decode a payload into its registered type.
    ///
    /// `None`, `null` and `{}` mean "no payload" and yield `Ok(None)`
    /// without validation.
    pub fn decode<T>(
        &self,
        action: Action,
        direction: Direction,
        payload: Option<&Value>,
    ) -> Result<Option<T>, CodecError>
    where
        T: DeserializeOwned + 'static,
    {
        let descriptor = self.descriptor::<T>(action, direction)?;

        let payload = match payload {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(members)) if members.is_empty() => return Ok(None),
            Some(payload) => payload,
        };

        let violations = descriptor.schema.validate(payload);
        if !violations.is_empty() {
            return Err(CodecError::SchemaValidation {
                action,
                direction,
                payload: payload.clone(),
                violations,
                mapping: None,
            });
        }

        serde_json::from_value(payload.clone())
            .map(Some)
            .map_err(|e| CodecError::SchemaValidation {
                action,
                direction,
                payload: payload.clone(),
                violations: Vec::new(),
                mapping: Some(e.to_string()),
            })
    }

    /// Decode a payload the action cannot do without.
    ///
    /// "No payload" is read as `{}` and must satisfy the schema like any
    /// other object, so a missing BootNotification body reports its
    /// required members.
    pub fn decode_required<T>(
        &self,
        action: Action,
        direction: Direction,
        payload: Option<&Value>,
    ) -> Result<T, CodecError>
    where
        T: DeserializeOwned + 'static,
    {
        if let Some(value) = self.decode(action, direction, payload)? {
            return Ok(value);
        }

        let empty = json!({});
        let descriptor = self.descriptor::<T>(action, direction)?;
        let violations = descriptor.schema.validate(&empty);
        let mapped = if violations.is_empty() {
            serde_json::from_value(empty.clone()).map_err(|e| e.to_string())
        } else {
            Err(String::new())
        };

        mapped.map_err(|mapping| CodecError::SchemaValidation {
            action,
            direction,
            payload: empty,
            violations,
            mapping: Some(mapping).filter(|m| !m.is_empty()),
        })
    }

    /// Serialize and validate a payload.
    ///
    /// `null` members are dropped; OCPP-J carries absent optionals by omission.
    /// Decimal members serialized as strings are written as JSON numbers.
    pub fn encode<T>(&self, action: Action, direction: Direction, value: &T) -> Result<Value, CodecError>
    where
        T: Serialize + 'static,
    {
        let descriptor = self.descriptor::<T>(action, direction)?;

        let mut payload = serde_json::to_value(value).map_err(|e| CodecError::Serialization {
            action,
            message: e.to_string(),
        })?;
        strip_nulls(&mut payload);
        descriptor.schema.coerce_numbers(&mut payload);

        let violations = descriptor.schema.validate(&payload);
        if violations.is_empty() {
            Ok(payload)
        } else {
            Err(CodecError::SchemaValidation {
                action,
                direction,
                payload,
                violations,
                mapping: None,
            })
        }
    }

    fn descriptor<T: 'static>(
        &self,
        action: Action,
        direction: Direction,
    ) -> Result<&PayloadDescriptor, CodecError> {
        let descriptor = self.catalog.descriptor(action, direction).ok_or_else(|| {
            CodecError::UnsupportedAction {
                version: self.version(),
                action: action.name().to_string(),
                known: true,
            }
        })?;

        if descriptor.type_id != TypeId::of::<T>() {
            return Err(CodecError::TypeMismatch {
                action,
                direction,
                expected: descriptor.type_name,
                found: type_name::<T>(),
            });
        }
        Ok(descriptor)
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(members) => {
            members.retain(|_, v| !v.is_null());
            members.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
