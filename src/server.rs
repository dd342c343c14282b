//! Server lifecycle: wiring, startup and graceful shutdown
//!
//! [`ServerHandle::start`] builds the managers and the dispatcher from an
//! [`AppConfig`], starts the WebSocket server and the pending-request
//! sweeper, and hands back a handle used to stop them.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::charge_point::{ChargePointManager, StaticRegistrationPolicy};
use crate::application::dispatch::{spawn_sweeper, CentralSystem, CommandDispatcher, StartupError};
use crate::application::queue::ActionMessageQueue;
use crate::application::session::ChargeSessionManager;
use crate::config::AppConfig;
use crate::interfaces::ws::{
    ConnectionRegistry, OcppServer, ServerError, SharedConnectionRegistry,
};
use crate::support::shutdown::{listen_for_shutdown_signals, shutdown_with_cleanup, ShutdownSignal};

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Failed to start Prometheus exporter on {addr}: {message}")]
    Metrics { addr: String, message: String },
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn install_metrics_exporter(listen: &str) -> Result<(), StartError> {
    let metrics_error = |message: String| StartError::Metrics {
        addr: listen.to_string(),
        message,
    };
    let addr: SocketAddr = listen.parse().map_err(|e| metrics_error(format!("{}", e)))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| metrics_error(e.to_string()))?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Handle to a running central system
pub struct ServerHandle {
    pub central: Arc<CentralSystem>,
    pub commands: Arc<CommandDispatcher>,
    pub registry: SharedConnectionRegistry,
    /// Address the WebSocket server is bound to
    pub local_addr: Option<SocketAddr>,
    config: AppConfig,
    shutdown: ShutdownSignal,
    ws_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the central system with the given configuration.
    ///
    /// This will:
    /// 1. Install the Prometheus exporter (when `metrics.listen` is set)
    /// 2. Build the action catalogs and the managers
    /// 3. Start the OCPP WebSocket server
    /// 4. Start the pending-request sweeper
    pub async fn start(config: AppConfig) -> Result<Self, StartError> {
        if let Some(listen) = &config.metrics.listen {
            install_metrics_exporter(listen)?;
        }

        let (central, registry) = Self::build_central_system(&config)?;
        let central = Arc::new(central);
        let commands = Arc::new(CommandDispatcher::new(central.clone()));
        let shutdown = ShutdownSignal::new();

        let server = OcppServer::bind(&config.server.address(), central.clone(), registry.clone()).await?;
        let local_addr = server.local_addr();
        let ws_task = tokio::spawn(server.run(shutdown.clone()));

        let sweeper_task = spawn_sweeper(
            central.queue().clone(),
            config.queue.response_timeout(),
            config.queue.sweep_interval(),
            shutdown.clone(),
        );

        info!(
            address = config.server.address().as_str(),
            default_registration = %config.registration.default_status,
            heartbeat_interval_secs = config.registration.heartbeat_interval_secs,
            "OCPP central system started"
        );

        Ok(Self {
            central,
            commands,
            registry,
            local_addr,
            config,
            shutdown,
            ws_task,
            sweeper_task,
        })
    }

    /// Build the central system and its connection registry without
    /// starting anything. Used by `--check`.
    pub fn build_central_system(
        config: &AppConfig,
    ) -> Result<(CentralSystem, SharedConnectionRegistry), StartupError> {
        let registry = ConnectionRegistry::shared();
        let policy = StaticRegistrationPolicy::new(config.registration.default_status);
        let tags = config.authorization.id_tag_store();
        info!(
            id_tags = tags.len(),
            accept_unknown = config.authorization.accept_unknown,
            "Id tag list loaded"
        );

        let central = CentralSystem::new(
            ActionMessageQueue::shared(),
            Arc::new(ChargePointManager::new(Arc::new(policy))),
            Arc::new(ChargeSessionManager::new(Arc::new(tags))),
            registry.clone(),
            config.dispatch_settings(),
        )?;
        Ok((central, registry))
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Trigger shutdown on SIGINT / SIGTERM.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Wait for shutdown, then for the server and the sweeper to stop.
    /// Returns `false` when they did not stop within the shutdown timeout.
    pub async fn wait(self) -> bool {
        let Self {
            shutdown,
            ws_task,
            sweeper_task,
            config,
            ..
        } = self;

        shutdown_with_cleanup(&shutdown, config.server.shutdown_timeout(), || async move {
            if let Err(e) = ws_task.await {
                warn!(error = %e, "WebSocket server task failed");
            }
            if let Err(e) = sweeper_task.await {
                warn!(error = %e, "Sweeper task failed");
            }
        })
        .await
    }
}
