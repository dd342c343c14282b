//! Charging session (transaction) entity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ocpp::ClientIdentity;

/// Outcome of an id tag authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

impl AuthorizationStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "Accepted",
            Self::Blocked => "Blocked",
            Self::Expired => "Expired",
            Self::Invalid => "Invalid",
            Self::ConcurrentTx => "ConcurrentTx",
        };
        f.write_str(s)
    }
}

/// Authorization record echoed back to the station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub status: AuthorizationStatus,
    pub expiry_date: Option<DateTime<Utc>>,
    pub parent_id_tag: Option<String>,
}

impl AuthorizationInfo {
    pub fn with_status(status: AuthorizationStatus) -> Self {
        Self {
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

/// One metered reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledValue {
    pub timestamp: DateTime<Utc>,
    /// Wire name of the measurand; `None` means the protocol default
    /// (`Energy.Active.Import.Register`).
    pub measurand: Option<String>,
    pub value: String,
    pub unit: Option<String>,
    pub context: Option<String>,
    pub phase: Option<String>,
    pub location: Option<String>,
}

impl SampledValue {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            measurand: None,
            value: value.into(),
            unit: None,
            context: None,
            phase: None,
            location: None,
        }
    }

    pub fn with_measurand(mut self, measurand: impl Into<String>) -> Self {
        self.measurand = Some(measurand.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Reading of the imported energy register in Wh, if this is one.
    pub fn energy_register_wh(&self) -> Option<i64> {
        match self.measurand.as_deref() {
            None | Some(ENERGY_REGISTER) => {}
            Some(_) => return None,
        }
        let value: f64 = self.value.trim().parse().ok()?;
        let wh = match self.unit.as_deref() {
            Some(unit) if unit.eq_ignore_ascii_case("kWh") => value * 1000.0,
            _ => value,
        };
        Some(wh.round() as i64)
    }
}

const ENERGY_REGISTER: &str = "Energy.Active.Import.Register";

/// Data supplied when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStartInfo {
    pub charge_point: ClientIdentity,
    pub evse_id: Option<u32>,
    pub connector_id: u32,
    /// `None` when the station started without local authorization
    /// (e.g. a remote start already authorized by the central system).
    pub id_tag: Option<String>,
    /// Station-assigned transaction id (2.0.1). Generated when absent.
    pub transaction_id: Option<String>,
    /// Meter register at start, in Wh.
    pub meter_start: Option<i64>,
    pub reservation_id: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl SessionStartInfo {
    pub fn new(charge_point: ClientIdentity, connector_id: u32) -> Self {
        Self {
            charge_point,
            evse_id: None,
            connector_id,
            id_tag: None,
            transaction_id: None,
            meter_start: None,
            reservation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id_tag(mut self, id_tag: impl Into<String>) -> Self {
        self.id_tag = Some(id_tag.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_meter_start(mut self, meter_start: i64) -> Self {
        self.meter_start = Some(meter_start);
        self
    }
}

/// Data supplied when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndInfo {
    pub charge_point: ClientIdentity,
    pub transaction_id: String,
    pub id_tag: Option<String>,
    /// Meter register at stop, in Wh.
    pub meter_stop: Option<i64>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SessionEndInfo {
    pub fn new(charge_point: ClientIdentity, transaction_id: impl Into<String>) -> Self {
        Self {
            charge_point,
            transaction_id: transaction_id.into(),
            id_tag: None,
            meter_stop: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_id_tag(mut self, id_tag: impl Into<String>) -> Self {
        self.id_tag = Some(id_tag.into());
        self
    }

    pub fn with_meter_stop(mut self, meter_stop: i64) -> Self {
        self.meter_stop = Some(meter_stop);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub id: Uuid,
    pub charge_point: ClientIdentity,
    pub evse_id: Option<u32>,
    pub connector_id: u32,
    pub transaction_id: String,
    pub start: SessionStartInfo,
    /// Authorization granted at start, if the start carried an id tag.
    pub authorization: Option<AuthorizationInfo>,
    pub readings: Vec<SampledValue>,
    pub end: Option<SessionEndInfo>,
}

impl ChargeSession {
    pub fn new(
        start: SessionStartInfo,
        transaction_id: String,
        authorization: Option<AuthorizationInfo>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            charge_point: start.charge_point.clone(),
            evse_id: start.evse_id,
            connector_id: start.connector_id,
            transaction_id,
            start,
            authorization,
            readings: Vec::new(),
            end: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    pub fn append_readings(&mut self, readings: impl IntoIterator<Item = SampledValue>) {
        self.readings.extend(readings);
    }

    pub fn finish(&mut self, end: SessionEndInfo) {
        self.end = Some(end);
    }

    /// Energy consumed in Wh, once both meter registers are known.
    pub fn energy_consumed(&self) -> Option<i64> {
        let stop = self.end.as_ref()?.meter_stop?;
        Some(stop - self.start.meter_start?)
    }

    /// Most recent reading for a measurand (`None` = default energy register).
    pub fn latest_reading(&self, measurand: Option<&str>) -> Option<&SampledValue> {
        self.readings
            .iter()
            .rev()
            .find(|r| r.measurand.as_deref() == measurand)
    }
}

// ── Tests ──────────────────────────────────────────────────────
