//! Charging session aggregate
//!
//! Session entity, start/end records, readings and authorization results.

pub mod model;

pub use model::{
    AuthorizationInfo, AuthorizationStatus, ChargeSession, SampledValue, SessionEndInfo,
    SessionStartInfo,
};
