//! # Nexus API Server
//!
//! ```text
//!   nexus-api [--config <path>]
//!
//!   config ──► Database ──► Dispatcher task ──► Reservation sweeper ──► axum
//!                                                                        │
//!   SIGINT / SIGTERM ──► stop accepting ──► stop sweeper ──► drain outbox
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nexus_api::config::ApiConfig;
use nexus_api::sweeper::ReservationSweeper;
use nexus_api::{build_router, AppState};
use nexus_db::{Database, DbConfig};
use nexus_notify::{ChannelSet, Dispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nexus=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Nexus API server...");

    let config = ApiConfig::load(config_path_arg()?).context("Failed to load configuration")?;
    let db_path = config.database.resolved_path();
    info!(
        bind = %config.server.bind_address(),
        environment = ?config.server.environment,
        database = %db_path.display(),
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(db_path).max_connections(config.database.max_connections))
        .await
        .context("Failed to open database")?;

    let channels = ChannelSet::from_config(&config.notifications).context("Invalid notification settings")?;
    let notifier = Dispatcher::new(db.clone(), channels).start();
    let sweeper = ReservationSweeper::new(db.clone(), &config.inventory).start();

    let bind = config.server.bind_address();
    let state = AppState::new(db.clone(), config, notifier.clone());
    let router = build_router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, "Listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    if let Err(e) = notifier.shutdown().await {
        warn!(error = %e, "Notification dispatcher did not stop cleanly");
    }
    db.close().await;

    served.context("Server error")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Reads `--config <path>` from the command line.
fn config_path_arg() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(value) => path = Some(PathBuf::from(value)),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(path)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
