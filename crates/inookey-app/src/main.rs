//! Inookey application binary - composition root.
//!
//! 1. Load configuration (file, then env vars, then CLI flags)
//! 2. Open the SQLite database and run migrations
//! 3. Connect to the model host and make sure the model is present
//! 4. Start the idle-connection sweeper
//! 5. Serve the REST API and WebSocket endpoint until shutdown

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use inookey_api::start_server;
use inookey_api::state::AppState;
use inookey_chat::ModelGateway;
use inookey_core::config::InookeyConfig;
use inookey_core::error::InookeyError;
use inookey_storage::Database;

use cli::{expand_home, CliArgs};

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();

    let (mut config, load_error) = if config_file.exists() {
        match InookeyConfig::load(&config_file) {
            Ok(c) => (c, None),
            Err(e) => (InookeyConfig::default(), Some(e)),
        }
    } else {
        (InookeyConfig::default(), None)
    };
    config.apply_env_overrides();
    args.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "Configuration resolved"),
    }

    let data_dir = expand_home(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("inookey.db");
    let database = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "Database ready");

    let gateway = Arc::new(ModelGateway::from_config(&config.ollama)?);
    if let Err(e) = gateway.initialize().await {
        tracing::error!(
            error = %e,
            host = %config.ollama.host,
            model = %config.ollama.model,
            "Model host unavailable, refusing to start"
        );
        return Err(InookeyError::Startup(format!("model service unavailable: {}", e)).into());
    }

    let sweep_interval = Duration::from_secs(config.websocket.sweep_interval_secs);
    let inactivity = Duration::from_secs(config.websocket.inactivity_timeout_secs);

    let state = AppState::new(config, database, gateway);
    let sweeper = state.connections.spawn_sweeper(sweep_interval, inactivity);

    let result = start_server(state, shutdown_signal()).await;
    sweeper.abort();

    if let Err(e) = result {
        tracing::error!(error = %e, "Server exited with error");
        return Err(e.into());
    }

    tracing::info!("Inookey stopped");
    Ok(())
}
