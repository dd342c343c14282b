//! Charge Point aggregate
//!
//! Registration record, station metadata and connector status snapshots.

pub mod model;

pub use model::{
    ChargePointInfo, ChargePointRegistration, ConnectorKey, ConnectorStatusSnapshot,
    RegistrationStatus,
};
