//! # OCPP Central System
//!
//! Central-system core for OCPP 1.6 and 2.0.1 charge points over OCPP-J.
//!
//! ## Architecture
//!
//! - **domain**: protocol value objects, charge point and session aggregates
//! - **application**: codec, error codes, pending request queue, managers
//!   and the dispatcher tying them together
//! - **interfaces**: WebSocket server and connection registry
//! - **support**: OCPP-J framing and shutdown signalling
//! - **config**: TOML configuration
//! - **server**: startup wiring, tracing and shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod interfaces;
pub mod server;
pub mod support;

pub use application::dispatch::{CentralSystem, CommandDispatcher, DispatchSettings, ResetKind};
pub use config::{default_config_path, AppConfig, ConfigError};
