//! Domain model
//!
//! Protocol value objects, the charge point registration aggregate and the
//! charging session aggregate. Nothing in here knows about transports,
//! schemas or concurrency.

pub mod charge_point;
pub mod ocpp;
pub mod session;

pub use charge_point::{
    ChargePointInfo, ChargePointRegistration, ConnectorKey, ConnectorStatusSnapshot,
    RegistrationStatus,
};
pub use ocpp::{Action, ClientIdentity, Direction, Initiator, OcppVersion, UnknownAction};
pub use session::{
    AuthorizationInfo, AuthorizationStatus, ChargeSession, SampledValue, SessionEndInfo,
    SessionStartInfo,
};
