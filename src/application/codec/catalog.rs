//! Per-version registry of action payload types and schemas

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use thiserror::Error;

use super::schema::{Dialect, Schema, SchemaError};
use crate::domain::{Action, Direction, OcppVersion};

pub use super::v16::v16;
pub use super::v201::v201;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{version} schema for {action}{direction:?} is invalid: {source}")]
    Schema {
        version: OcppVersion,
        action: Action,
        direction: Direction,
        #[source]
        source: SchemaError,
    },

    #[error("{version} schema for {action}{direction:?} has id {found:?}, expected {expected}")]
    IdMismatch {
        version: OcppVersion,
        action: Action,
        direction: Direction,
        expected: String,
        found: Option<String>,
    },

    #[error("{action} is registered twice for {version}")]
    Duplicate { version: OcppVersion, action: Action },
}

/// Schema and Rust type registered for one (action, direction)
#[derive(Debug)]
pub struct PayloadDescriptor {
    pub action: Action,
    pub direction: Direction,
    pub schema: Schema,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

/// Actions usable on a protocol version, with their payload schemas
#[derive(Debug)]
pub struct ActionCatalog {
    version: OcppVersion,
    entries: HashMap<(Action, Direction), PayloadDescriptor>,
}

impl ActionCatalog {
    pub fn builder(version: OcppVersion) -> CatalogBuilder {
        CatalogBuilder {
            version,
            dialect: match version {
                OcppVersion::V16 => Dialect::Draft04,
                OcppVersion::V201 => Dialect::Draft06,
            },
            entries: HashMap::new(),
        }
    }

    pub fn version(&self) -> OcppVersion {
        self.version
    }

    pub fn descriptor(&self, action: Action, direction: Direction) -> Option<&PayloadDescriptor> {
        self.entries.get(&(action, direction))
    }

    pub fn supports(&self, action: Action) -> bool {
        self.entries.contains_key(&(action, Direction::Request))
    }

    /// Registered actions in name order
    pub fn actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .entries
            .keys()
            .filter(|(_, d)| *d == Direction::Request)
            .map(|(a, _)| *a)
            .collect();
        actions.sort_by_key(|a| a.name());
        actions
    }
}

/// URN a schema document must carry as its id
pub fn schema_urn(version: OcppVersion, action: Action, direction: Direction) -> String {
    format!(
        "urn:OCPP:{}:{}:{}{}",
        action.initiator().role(),
        version.schema_release(),
        action.name(),
        direction.suffix()
    )
}

#[derive(Debug)]
pub struct CatalogBuilder {
    version: OcppVersion,
    dialect: Dialect,
    entries: HashMap<(Action, Direction), PayloadDescriptor>,
}

impl CatalogBuilder {
    /// Register the request and response halves of `action`.
    pub fn register<Req: 'static, Resp: 'static>(
        mut self,
        action: Action,
        request_schema: &str,
        response_schema: &str,
    ) -> Result<Self, CatalogError> {
        if self.entries.contains_key(&(action, Direction::Request)) {
            return Err(CatalogError::Duplicate {
                version: self.version,
                action,
            });
        }

        let request = self.describe::<Req>(action, Direction::Request, request_schema)?;
        let response = self.describe::<Resp>(action, Direction::Response, response_schema)?;
        self.entries.insert((action, Direction::Request), request);
        self.entries.insert((action, Direction::Response), response);
        Ok(self)
    }

    pub fn build(self) -> ActionCatalog {
        ActionCatalog {
            version: self.version,
            entries: self.entries,
        }
    }

    fn describe<T: 'static>(
        &self,
        action: Action,
        direction: Direction,
        source: &str,
    ) -> Result<PayloadDescriptor, CatalogError> {
        let schema =
            Schema::parse(source, self.dialect).map_err(|source| CatalogError::Schema {
                version: self.version,
                action,
                direction,
                source,
            })?;

        let expected = schema_urn(self.version, action, direction);
        if schema.id() != Some(expected.as_str()) {
            return Err(CatalogError::IdMismatch {
                version: self.version,
                action,
                direction,
                expected,
                found: schema.id().map(str::to_string),
            });
        }

        Ok(PayloadDescriptor {
            action,
            direction,
            schema,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQ: &str = r#"{
        "$schema": "http://json-schema.org/draft-04/schema#",
        "id": "urn:OCPP:Cp:1:2015:10:HeartbeatRequest",
        "type": "object",
        "additionalProperties": false
    }"#;

    const RESP: &str = r#"{
        "$schema": "http://json-schema.org/draft-04/schema#",
        "id": "urn:OCPP:Cp:1:2015:10:HeartbeatResponse",
        "type": "object"
    }"#;

    #[test]
    fn test_urn_format() {
        assert_eq!(
            schema_urn(OcppVersion::V16, Action::Reset, Direction::Request),
            "urn:OCPP:Cs:1:2015:10:ResetRequest"
        );
        assert_eq!(
            schema_urn(OcppVersion::V201, Action::TransactionEvent, Direction::Response),
            "urn:OCPP:Cp:2:2020:3:TransactionEventResponse"
        );
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = ActionCatalog::builder(OcppVersion::V16)
            .register::<u8, u16>(Action::Heartbeat, REQ, RESP)
            .unwrap()
            .build();

        assert!(catalog.supports(Action::Heartbeat));
        assert!(!catalog.supports(Action::Reset));
        let descriptor = catalog
            .descriptor(Action::Heartbeat, Direction::Response)
            .unwrap();
        assert_eq!(descriptor.type_id, TypeId::of::<u16>());
        assert_eq!(catalog.actions(), vec![Action::Heartbeat]);
    }

    #[test]
    fn test_mismatched_id_fails() {
        let err = ActionCatalog::builder(OcppVersion::V16)
            .register::<u8, u16>(Action::Heartbeat, RESP, RESP)
            .unwrap_err();
        assert!(matches!(err, CatalogError::IdMismatch { direction: Direction::Request, .. }));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let err = ActionCatalog::builder(OcppVersion::V16)
            .register::<u8, u16>(Action::Heartbeat, REQ, RESP)
            .and_then(|b| b.register::<u8, u16>(Action::Heartbeat, REQ, RESP))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { .. }));
    }
}
