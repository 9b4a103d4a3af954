//! kvgate server binary
//!
//! Token-authenticated batch key-value service.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! kvgate --config config.yaml
//!
//! # With environment variables only
//! KVGATE_AUTH__SECRET=change-me KVGATE_STORAGE__BACKEND=memory kvgate
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kvgate_api::http::{create_router, create_router_with_observability, AppState};
use kvgate_api::middleware::cors_layer;
use kvgate_api::observability::{init_logging, init_metrics, LoggingConfig};
use kvgate_server::ServerConfig;
use kvgate_storage::{DataStore, MemoryDataStore, PostgresConfig, PostgresDataStore};

/// kvgate - batch key-value access over HTTP
#[derive(Parser, Debug)]
#[command(name = "kvgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(config_path) => ServerConfig::load(&config_path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.storage.backend,
        workers = config.batch.workers,
        "Starting kvgate server"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            let storage = MemoryDataStore::new();
            for seed in &config.auth.users {
                storage.insert_user(&seed.username, &seed.password);
            }
            run_server(Arc::new(storage), addr, &config).await
        }
        "postgres" => {
            let database_url = config.storage.database_url.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for postgres backend")
            })?;

            info!("Connecting to PostgreSQL database");
            let pg_config = PostgresConfig {
                database_url: database_url.clone(),
                max_connections: config.storage.pool_size,
                min_connections: 1,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                query_timeout_secs: config.storage.query_timeout_secs,
                ..Default::default()
            };

            let storage = PostgresDataStore::from_config(&pg_config).await?;
            info!("Running database migrations");
            storage.run_migrations().await?;

            for seed in &config.auth.users {
                storage.upsert_user(&seed.username, &seed.password).await?;
            }

            run_server(Arc::new(storage), addr, &config).await
        }
        other => anyhow::bail!("Unknown storage backend: {other}"),
    }
}

/// Serves the HTTP API until a shutdown signal arrives.
///
/// The shutdown token is shared with every request context, so batches still
/// running when the signal arrives end with a cancellation error.
async fn run_server<S: DataStore>(
    storage: Arc<S>,
    addr: SocketAddr,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    if config.auth.users.is_empty() {
        warn!("No auth.users configured; logins will only succeed for existing accounts");
    } else {
        info!(count = config.auth.users.len(), "Seeded user accounts");
    }

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(storage, config).with_shutdown(shutdown.clone());

    let router = if config.metrics.enabled {
        let metrics_state = init_metrics()?;
        info!("Metrics enabled at /metrics");
        create_router_with_observability(state, metrics_state)
    } else {
        create_router(state)
    };
    let router = router.layer(cors_layer());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
