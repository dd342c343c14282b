//! OCPP Central System
//!
//! Standalone WebSocket server for OCPP 1.6 and 2.0.1 charge points.
//!
//! ```bash
//! ocpp-central                               # default config file
//! ocpp-central --config /etc/ocpp/config.toml
//! ocpp-central --port 9100 --log-level debug
//! ocpp-central --check                       # validate config and exit
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info, warn};
use validator::Validate;

use ocpp_central::server::{init_tracing, ServerHandle};
use ocpp_central::{default_config_path, AppConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(
    name = "ocpp-central",
    version,
    about = "OCPP 1.6 / 2.0.1 central system",
    long_about = "Accepts charge point connections at ws://<host>:<port>/ocpp/{charge_point_id}, \
                  tracks registrations, connector status and charging sessions."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

/// A missing file falls back to defaults; the error is returned so it can
/// be logged once tracing is up.
fn load_config(path: &Path) -> Result<(AppConfig, Option<ConfigError>), ConfigError> {
    match AppConfig::load(path) {
        Ok(config) => Ok((config, None)),
        Err(e @ ConfigError::Io { .. }) if is_not_found(&e) => Ok((AppConfig::default(), Some(e))),
        Err(e) => Err(e),
    }
}

fn is_not_found(e: &ConfigError) -> bool {
    matches!(e, ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    let (mut config, missing) = match load_config(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    init_tracing(&config);
    match missing {
        Some(e) => error!(error = %e, "Config file not found, using defaults"),
        None => info!(path = %config_path.display(), "Configuration loaded"),
    }
    if cli.port.is_some() || cli.log_level.is_some() {
        info!(port = ?cli.port, log_level = ?cli.log_level, "CLI overrides applied");
    }

    if cli.check {
        ServerHandle::build_central_system(&config)?;
        println!("Configuration OK");
        println!("  WebSocket:      ws://{}/ocpp/{{charge_point_id}}", config.server.address());
        println!("  Registration:   {}", config.registration.default_status);
        println!("  Heartbeat:      {}s", config.registration.heartbeat_interval_secs);
        println!("  Response wait:  {}s", config.queue.response_timeout_secs);
        println!(
            "  Metrics:        {}",
            config.metrics.listen.as_deref().unwrap_or("disabled")
        );
        return Ok(());
    }

    let handle = match ServerHandle::start(config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "Failed to start");
            return Err(e.into());
        }
    };
    handle.install_signal_handler();

    if !handle.wait().await {
        warn!("Shutdown timed out");
    }
    info!("Goodbye");
    Ok(())
}
