//! Application layer
//!
//! Codec, error-code resolution, pending request bookkeeping, charge point
//! and session managers, and the dispatcher driving them.

pub mod charge_point;
pub mod codec;
pub mod dispatch;
pub mod errors;
pub mod ports;
pub mod queue;
pub mod session;
