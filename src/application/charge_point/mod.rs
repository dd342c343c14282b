mod manager;
mod policy;

pub use manager::{ChargePointManager, SharedChargePointManager};
pub use policy::{RegistrationPolicy, StaticRegistrationPolicy};
