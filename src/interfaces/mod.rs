//! External interfaces

pub mod ws;
