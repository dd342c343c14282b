//! Configuration module
//!
//! `AppConfig` is read from a TOML file, by default
//! `~/.config/ocpp-central/config.toml`. Every section and field is
//! optional; missing values take the defaults below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::application::dispatch::DispatchSettings;
use crate::application::session::InMemoryIdTagStore;
use crate::domain::{AuthorizationStatus, RegistrationStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// `~/.config/ocpp-central/config.toml`, or `./config.toml` when there is
/// no config directory.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("ocpp-central").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub logging: LoggingConfig,
    #[validate(nested)]
    pub registration: RegistrationConfig,
    pub authorization: AuthorizationConfig,
    #[validate(nested)]
    pub queue: QueueConfig,
    #[validate(nested)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            heartbeat_interval_secs: self.registration.heartbeat_interval_secs,
            response_timeout: self.queue.response_timeout(),
        }
    }
}

/// WebSocket server
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,
    #[validate(range(min = 1, message = "port must be non-zero"))]
    pub port: u16,
    /// Time given to open connections to close on shutdown
    #[validate(range(min = 1, max = 300))]
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            shutdown_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    #[validate(length(min = 1))]
    pub level: String,
    /// `text` or `json`
    #[validate(custom(function = "validate_log_format"))]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    match format.to_lowercase().as_str() {
        "text" | "json" => Ok(()),
        _ => Err(ValidationError::new("log_format")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Status given to identities on their first boot
    pub default_status: RegistrationStatus,
    #[validate(range(min = 1, max = 86_400))]
    pub heartbeat_interval_secs: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_status: RegistrationStatus::Accepted,
            heartbeat_interval_secs: 300,
        }
    }
}

/// Static id tag lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Accept tags that appear in none of the lists
    pub accept_unknown: bool,
    pub accepted: Vec<String>,
    pub blocked: Vec<String>,
    pub expired: Vec<String>,
}

impl AuthorizationConfig {
    pub fn id_tag_store(&self) -> InMemoryIdTagStore {
        let store = InMemoryIdTagStore::new(self.accept_unknown);
        let lists = [
            (&self.accepted, AuthorizationStatus::Accepted),
            (&self.blocked, AuthorizationStatus::Blocked),
            (&self.expired, AuthorizationStatus::Expired),
        ];
        for (tags, status) in lists {
            for tag in tags {
                store.set_status(tag.clone(), status);
            }
        }
        store
    }
}

/// Pending request handling
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueConfig {
    #[validate(range(min = 1, max = 3600))]
    pub response_timeout_secs: u64,
    #[validate(range(min = 1, max = 3600))]
    pub sweep_interval_secs: u64,
}

impl QueueConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
            sweep_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape address, e.g. `0.0.0.0:9100`. Disabled when unset.
    #[validate(custom(function = "validate_socket_addr"))]
    pub listen: Option<String>,
}

fn validate_socket_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("socket_addr"))
}
