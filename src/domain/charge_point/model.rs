//! Charge point registration entity

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ocpp::ClientIdentity;

/// Registration state of a charge point identity.
///
/// `Unregistered` is represented by the absence of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Vendor/model/serial metadata reported by the station at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePointInfo {
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
}

impl ChargePointInfo {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Connector-level status snapshot from a StatusNotification.
///
/// Status and error code are kept as the wire strings of the protocol
/// version that reported them (1.6 and 2.0.1 use different vocabularies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatusSnapshot {
    pub evse_id: Option<u32>,
    pub connector_id: u32,
    pub status: String,
    pub error_code: Option<String>,
    pub info: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConnectorStatusSnapshot {
    pub fn new(connector_id: u32, status: impl Into<String>) -> Self {
        Self {
            evse_id: None,
            connector_id,
            status: status.into(),
            error_code: None,
            info: None,
            vendor_id: None,
            vendor_error_code: None,
            timestamp: Utc::now(),
        }
    }

    /// Key under which the snapshot is filed on the registration.
    pub fn key(&self) -> ConnectorKey {
        ConnectorKey {
            evse_id: self.evse_id.unwrap_or(0),
            connector_id: self.connector_id,
        }
    }
}

/// `(evse, connector)` address; 1.6 connectors live under EVSE 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectorKey {
    pub evse_id: u32,
    pub connector_id: u32,
}

/// Charge point registration record
#[derive(Debug, Clone)]
pub struct ChargePointRegistration {
    pub identity: ClientIdentity,
    pub info: ChargePointInfo,
    pub status: RegistrationStatus,
    /// Administratively disabled stations are never considered accepted.
    pub disabled: bool,
    pub connectors: BTreeMap<ConnectorKey, ConnectorStatusSnapshot>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ChargePointRegistration {
    pub fn new(identity: ClientIdentity, info: ChargePointInfo, status: RegistrationStatus) -> Self {
        let now = Utc::now();
        Self {
            identity,
            info,
            status,
            disabled: false,
            connectors: BTreeMap::new(),
            registered_at: now,
            updated_at: now,
            last_heartbeat: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !self.disabled && self.status == RegistrationStatus::Accepted
    }

    pub fn update_info(&mut self, info: ChargePointInfo) {
        self.info = info;
        self.updated_at = Utc::now();
    }

    pub fn transition(&mut self, status: RegistrationStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_connector_status(&mut self, snapshot: ConnectorStatusSnapshot) {
        self.connectors.insert(snapshot.key(), snapshot);
    }

    pub fn connector(&self, evse_id: u32, connector_id: u32) -> Option<&ConnectorStatusSnapshot> {
        self.connectors.get(&ConnectorKey {
            evse_id,
            connector_id,
        })
    }

    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChargePointRegistration {
        ChargePointRegistration::new(
            ClientIdentity::v16("CP001"),
            ChargePointInfo::new("Vendor", "Model"),
            RegistrationStatus::Pending,
        )
    }

    #[test]
    fn new_registration_is_not_accepted() {
        let reg = sample();
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert!(!reg.is_accepted());
        assert!(reg.connectors.is_empty());
        assert!(reg.last_heartbeat.is_none());
    }

    #[test]
    fn disabled_registration_is_not_accepted() {
        let mut reg = sample();
        reg.transition(RegistrationStatus::Accepted);
        assert!(reg.is_accepted());
        reg.disabled = true;
        assert!(!reg.is_accepted());
    }

    #[test]
    fn connector_status_is_replaced_per_key() {
        let mut reg = sample();
        reg.record_connector_status(ConnectorStatusSnapshot::new(1, "Available"));
        reg.record_connector_status(ConnectorStatusSnapshot::new(1, "Charging"));
        reg.record_connector_status(ConnectorStatusSnapshot::new(2, "Faulted"));
        assert_eq!(reg.connectors.len(), 2);
        assert_eq!(reg.connector(0, 1).unwrap().status, "Charging");
    }

    #[test]
    fn evse_scoped_snapshots_do_not_collide() {
        let mut reg = sample();
        let mut a = ConnectorStatusSnapshot::new(1, "Available");
        a.evse_id = Some(1);
        let mut b = ConnectorStatusSnapshot::new(1, "Occupied");
        b.evse_id = Some(2);
        reg.record_connector_status(a);
        reg.record_connector_status(b);
        assert_eq!(reg.connector(1, 1).unwrap().status, "Available");
        assert_eq!(reg.connector(2, 1).unwrap().status, "Occupied");
    }
}
