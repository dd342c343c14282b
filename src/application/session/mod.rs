//! Charging session lifecycle

mod authorizer;
mod manager;

pub use authorizer::{IdTagAuthorizer, InMemoryIdTagStore};
pub use manager::{ChargeSessionManager, SessionError, SharedChargeSessionManager};
