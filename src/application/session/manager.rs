//! Charge session manager
//!
//! Sessions live in an arena keyed by session id. A per-charge-point index
//! maps active transaction ids and connectors onto arena entries; the index
//! entry of a charge point is held for the whole of every mutation, which
//! serializes starts, ends and reading appends of one station.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::IdTagAuthorizer;
use crate::domain::{
    AuthorizationInfo, ChargeSession, ClientIdentity, ConnectorKey, SampledValue, SessionEndInfo,
    SessionStartInfo,
};

const MAX_TRANSACTION_ID: u32 = 65_535;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Id tag {id_tag} not authorized: {}", .info.status)]
    Authorization {
        id_tag: String,
        info: AuthorizationInfo,
    },

    #[error("Connector {connector_id} of {charge_point} is busy with transaction {transaction_id}")]
    ConnectorBusy {
        charge_point: ClientIdentity,
        connector_id: u32,
        transaction_id: String,
    },

    #[error("Transaction {transaction_id} is already active on {charge_point}")]
    DuplicateTransaction {
        charge_point: ClientIdentity,
        transaction_id: String,
    },

    #[error("No active session on {charge_point} for {reference}")]
    NotActive {
        charge_point: ClientIdentity,
        reference: String,
    },

    #[error("Readings for {charge_point} match several active sessions: {}", .transaction_ids.join(", "))]
    AmbiguousSession {
        charge_point: ClientIdentity,
        transaction_ids: Vec<String>,
    },

    #[error("No free transaction id left on {0}")]
    TransactionIdsExhausted(ClientIdentity),
}

/// Active sessions of one charge point
#[derive(Debug, Default)]
struct ActiveIndex {
    by_transaction: HashMap<String, Uuid>,
    by_connector: HashMap<ConnectorKey, Uuid>,
}

fn connector_key(evse_id: Option<u32>, connector_id: u32) -> ConnectorKey {
    ConnectorKey {
        evse_id: evse_id.unwrap_or(0),
        connector_id,
    }
}

pub struct ChargeSessionManager {
    sessions: DashMap<Uuid, ChargeSession>,
    active: DashMap<ClientIdentity, ActiveIndex>,
    authorizer: Arc<dyn IdTagAuthorizer>,
}

pub type SharedChargeSessionManager = Arc<ChargeSessionManager>;

impl ChargeSessionManager {
    pub fn new(authorizer: Arc<dyn IdTagAuthorizer>) -> Self {
        Self {
            sessions: DashMap::new(),
            active: DashMap::new(),
            authorizer,
        }
    }

    pub fn authorizer(&self) -> &Arc<dyn IdTagAuthorizer> {
        &self.authorizer
    }

    /// Start a session on a free connector.
    ///
    /// Starts without an id tag were authorized elsewhere (remote start,
    /// free vend) and skip the authorizer.
    pub fn start_charging_session(
        &self,
        info: SessionStartInfo,
    ) -> Result<ChargeSession, SessionError> {
        let authorization = match &info.id_tag {
            Some(id_tag) => {
                let auth = self.authorizer.authorize(&info.charge_point, id_tag);
                if !auth.status.is_accepted() {
                    warn!(
                        charge_point_id = info.charge_point.charge_point_id(),
                        id_tag = id_tag.as_str(),
                        status = %auth.status,
                        "Session start not authorized"
                    );
                    return Err(SessionError::Authorization {
                        id_tag: id_tag.clone(),
                        info: auth,
                    });
                }
                Some(auth)
            }
            None => None,
        };

        let charge_point = info.charge_point.clone();
        let key = connector_key(info.evse_id, info.connector_id);
        let mut index = self.active.entry(charge_point.clone()).or_default();

        if let Some(existing) = index.by_connector.get(&key) {
            let transaction_id = self
                .sessions
                .get(existing)
                .map(|s| s.transaction_id.clone())
                .unwrap_or_default();
            return Err(SessionError::ConnectorBusy {
                charge_point,
                connector_id: info.connector_id,
                transaction_id,
            });
        }

        let transaction_id = match &info.transaction_id {
            Some(id) if index.by_transaction.contains_key(id) => {
                return Err(SessionError::DuplicateTransaction {
                    charge_point,
                    transaction_id: id.clone(),
                })
            }
            Some(id) => id.clone(),
            None => generate_transaction_id(&index)
                .ok_or_else(|| SessionError::TransactionIdsExhausted(charge_point.clone()))?,
        };

        let session = ChargeSession::new(info, transaction_id.clone(), authorization);
        index.by_transaction.insert(transaction_id.clone(), session.id);
        index.by_connector.insert(key, session.id);
        self.sessions.insert(session.id, session.clone());

        info!(
            charge_point_id = charge_point.charge_point_id(),
            transaction_id = transaction_id.as_str(),
            connector_id = session.connector_id,
            evse_id = ?session.evse_id,
            session_id = %session.id,
            "Charging session started"
        );
        Ok(session)
    }

    pub fn get_active_charging_session(
        &self,
        charge_point: &ClientIdentity,
        transaction_id: &str,
    ) -> Result<ChargeSession, SessionError> {
        self.active
            .get(charge_point)
            .and_then(|index| index.by_transaction.get(transaction_id).copied())
            .and_then(|id| self.sessions.get(&id).map(|s| s.clone()))
            .filter(ChargeSession::is_active)
            .ok_or_else(|| not_active(charge_point, format!("transaction {}", transaction_id)))
    }

    /// Active sessions, optionally restricted to one charge point, oldest first.
    pub fn get_active_charging_sessions(
        &self,
        charge_point: Option<&ClientIdentity>,
    ) -> Vec<ChargeSession> {
        let mut sessions: Vec<ChargeSession> = self
            .sessions
            .iter()
            .filter(|s| s.is_active())
            .filter(|s| charge_point.map_or(true, |cp| &s.charge_point == cp))
            .map(|s| s.clone())
            .collect();
        sessions.sort_by_key(|s| s.start.timestamp);
        sessions
    }

    /// Session by id, active or ended
    pub fn get_charging_session(&self, id: Uuid) -> Option<ChargeSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Append readings to the one active session on the given connector.
    ///
    /// `None` filters match any EVSE / connector; the target must still be
    /// unique.
    pub fn add_charging_session_readings(
        &self,
        charge_point: &ClientIdentity,
        evse_id: Option<u32>,
        connector_id: Option<u32>,
        readings: Vec<SampledValue>,
    ) -> Result<ChargeSession, SessionError> {
        let reference = || match (evse_id, connector_id) {
            (Some(evse), Some(conn)) => format!("evse {} connector {}", evse, conn),
            (Some(evse), None) => format!("evse {}", evse),
            (None, Some(conn)) => format!("connector {}", conn),
            (None, None) => "any connector".to_string(),
        };

        let index = self
            .active
            .get(charge_point)
            .ok_or_else(|| not_active(charge_point, reference()))?;

        let candidates: Vec<Uuid> = index
            .by_connector
            .iter()
            .filter(|(key, _)| evse_id.map_or(true, |e| key.evse_id == e))
            .filter(|(key, _)| connector_id.map_or(true, |c| key.connector_id == c))
            .map(|(_, id)| *id)
            .collect();

        let session_id = match candidates.as_slice() {
            [] => return Err(not_active(charge_point, reference())),
            [only] => *only,
            many => {
                let mut transaction_ids: Vec<String> = many
                    .iter()
                    .filter_map(|id| self.sessions.get(id).map(|s| s.transaction_id.clone()))
                    .collect();
                transaction_ids.sort();
                return Err(SessionError::AmbiguousSession {
                    charge_point: charge_point.clone(),
                    transaction_ids,
                });
            }
        };

        let session = self.append(session_id, readings);
        drop(index);
        session.ok_or_else(|| not_active(charge_point, reference()))
    }

    /// Append readings to an active session identified by transaction id.
    pub fn add_transaction_readings(
        &self,
        charge_point: &ClientIdentity,
        transaction_id: &str,
        readings: Vec<SampledValue>,
    ) -> Result<ChargeSession, SessionError> {
        let index = self.active.get(charge_point);
        let session_id = index
            .as_ref()
            .and_then(|index| index.by_transaction.get(transaction_id).copied());

        let session = session_id.and_then(|id| self.append(id, readings));
        drop(index);
        session.ok_or_else(|| not_active(charge_point, format!("transaction {}", transaction_id)))
    }

    /// End an active session.
    ///
    /// When the stop carries an id tag it is authorized again and the result
    /// is returned for the station; the session ends either way.
    pub fn end_charging_session(
        &self,
        info: SessionEndInfo,
    ) -> Result<Option<AuthorizationInfo>, SessionError> {
        let authorization = info
            .id_tag
            .as_ref()
            .map(|id_tag| self.authorizer.authorize(&info.charge_point, id_tag));
        self.finish(info)?;
        Ok(authorization)
    }

    /// Administrative end of a session, without station involvement.
    pub fn force_end_charging_session(
        &self,
        charge_point: &ClientIdentity,
        transaction_id: &str,
        reason: &str,
    ) -> Result<ChargeSession, SessionError> {
        let end = SessionEndInfo::new(charge_point.clone(), transaction_id).with_reason(reason);
        self.finish(end)
    }

    fn finish(&self, end: SessionEndInfo) -> Result<ChargeSession, SessionError> {
        let charge_point = end.charge_point.clone();
        let transaction_id = end.transaction_id.clone();
        let reference = || format!("transaction {}", transaction_id);

        let mut index = self
            .active
            .get_mut(&charge_point)
            .ok_or_else(|| not_active(&charge_point, reference()))?;
        let session_id = index
            .by_transaction
            .remove(&transaction_id)
            .ok_or_else(|| not_active(&charge_point, reference()))?;
        index.by_connector.retain(|_, id| *id != session_id);

        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_active(&charge_point, reference()))?;
        session.finish(end);

        info!(
            charge_point_id = charge_point.charge_point_id(),
            transaction_id = transaction_id.as_str(),
            session_id = %session_id,
            readings = session.readings.len(),
            energy_wh = ?session.energy_consumed(),
            reason = ?session.end.as_ref().and_then(|e| e.reason.as_deref()),
            "Charging session ended"
        );
        Ok(session.clone())
    }

    fn append(&self, session_id: Uuid, readings: Vec<SampledValue>) -> Option<ChargeSession> {
        let mut session = self.sessions.get_mut(&session_id)?;
        session.append_readings(readings);
        Some(session.clone())
    }
}

fn not_active(charge_point: &ClientIdentity, reference: String) -> SessionError {
    SessionError::NotActive {
        charge_point: charge_point.clone(),
        reference,
    }
}

/// Ids in the generated space: canonical decimals in [1, 65535]
fn is_generated_id(id: &str) -> bool {
    id.parse::<u32>()
        .map_or(false, |n| (1..=MAX_TRANSACTION_ID).contains(&n) && n.to_string() == id)
}

/// Random id in [1, 65535] not used by an active session of the station.
fn generate_transaction_id(index: &ActiveIndex) -> Option<String> {
    let taken = index
        .by_transaction
        .keys()
        .filter(|id| is_generated_id(id))
        .count();
    if taken >= MAX_TRANSACTION_ID as usize {
        return None;
    }
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(1..=MAX_TRANSACTION_ID).to_string();
        if !index.by_transaction.contains_key(&candidate) {
            return Some(candidate);
        }
    }
}
