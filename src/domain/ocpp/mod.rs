//! OCPP protocol shared types
//!
//! Value objects related to the OCPP protocol that don't belong
//! to a single aggregate: protocol versions, actions, connection identities.

pub mod action;
pub mod identity;
pub mod version;

pub use action::{Action, Direction, Initiator, UnknownAction};
pub use identity::ClientIdentity;
pub use version::OcppVersion;
