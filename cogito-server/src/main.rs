//! c0gito Activity Server
//!
//! Folds confidential-transfer chain events into a queryable read model of
//! deposits, transfers and user activity.

mod api;
mod config;
mod server;
mod shutdown;
mod state;
#[cfg(test)]
mod testing;

use clap::Parser;
use cogito_core::events::{ingest_command_channel, projection_command_channel, state_change_channel};
use cogito_core::issues::IssueLog;
use cogito_core::log::{EventLog, MemoryEventLog, PgEventLog};
use cogito_core::processors::{IngestHandle, Ingester, Projector};
use cogito_core::query::read_model_channel;
use config::file::StorageBackend;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// c0gito - activity read model over confidential transfer events
#[derive(Parser, Debug)]
#[command(name = "cogito-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./cogito-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting cogito-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded_config.server.listen;
    let storage = loaded_config.storage.clone();
    let issue_capacity = loaded_config.issue_capacity;
    let rebuild_workers = loaded_config.rebuild_workers;
    let shared_config = loaded_config.into_shared();

    // Event log
    let (event_log, db_pool): (Arc<dyn EventLog>, Option<PgPool>) = match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory event log, nothing survives a restart");
            (Arc::new(MemoryEventLog::new()), None)
        }
        StorageBackend::Postgres => {
            let database_url = get_database_url().map_err(|e| {
                tracing::error!("DATABASE_URL environment variable not set");
                e
            })?;

            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(storage.max_connections)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            if args.migrate {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("../migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to run migrations: {}", e);
                        e
                    })?;
                tracing::info!("Migrations completed successfully");
            }

            (Arc::new(PgEventLog::new(db_pool.clone())), Some(db_pool))
        }
    };

    // Processors
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ingest_tx, ingest_rx) = ingest_command_channel();
    let (projection_tx, projection_rx) = projection_command_channel();
    let (change_tx, _) = state_change_channel();
    let (publisher, reader) = read_model_channel();
    let issues = IssueLog::new(issue_capacity);

    let ingester = Ingester::bootstrap(event_log, issues.clone(), projection_tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load the event log: {}", e);
            e
        })?;
    let ingester_task = tokio::spawn(ingester.run(
        shutdown_rx.clone(),
        ingest_rx,
        shared_config.ingest.subscribe(),
    ));

    let mut projector = Projector::new(publisher, change_tx.clone());
    if let Some(workers) = rebuild_workers {
        projector = projector.with_workers(workers);
    }
    let projector_task = tokio::spawn(projector.run(shutdown_rx.clone(), projection_rx));

    let state = AppState::new(
        shared_config,
        IngestHandle::new(ingest_tx),
        reader,
        change_tx,
        issues,
        shutdown_rx,
    );

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_signal(shutdown_tx.clone())).await;

    // The server may also have stopped on a bind error.
    let _ = shutdown_tx.send(true);
    for (name, task) in [("ingester", ingester_task), ("projector", projector_task)] {
        if let Err(e) = task.await {
            tracing::error!("The {} task failed: {}", name, e);
        }
    }
    reload_notify.notify_one();

    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
