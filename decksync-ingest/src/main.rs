//! decksync-ingest - Tournament decklist ingestion service
//!
//! Serves the sync trigger API over HTTP, or with `--once` runs a single
//! sync, prints the result as JSON and exits (exit code 1 on a failed run).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use decksync_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decksync_ingest::db::{SqliteCardCatalog, SqliteGateway};
use decksync_ingest::models::SyncParameters;
use decksync_ingest::services::{HttpSourceClient, SyncOrchestrator};
use decksync_ingest::AppState;

/// Command-line arguments for decksync-ingest
#[derive(Parser, Debug)]
#[command(name = "decksync-ingest")]
#[command(about = "Tournament decklist ingestion service")]
#[command(version)]
struct Args {
    /// Folder holding the database (overrides DECKSYNC_ROOT_FOLDER and the config file)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "DECKSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "DECKSYNC_PORT")]
    port: Option<u16>,

    /// Run one sync, print the result as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting decksync-ingest");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => warn!("No config directory on this platform, using defaults"),
    }
    info!("Source: {} ({})", config.source.name, config.source.base_url);

    // Root folder and database
    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_toml_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = decksync_ingest::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    // Collaborators are built here and handed to the orchestrator
    let source = HttpSourceClient::new(&config.source).context("Failed to build source client")?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(source),
        Arc::new(SqliteCardCatalog::new(db_pool.clone())),
        Arc::new(SqliteGateway::new(db_pool.clone())),
        SyncParameters::from(config.sync.clone()),
    ));

    if args.once {
        return run_once(&orchestrator).await;
    }

    let state = AppState::new(db_pool, orchestrator, config.server.trigger_token.clone());
    let app = decksync_ingest::build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Single sync run for `--once`; Ctrl+C cancels it
async fn run_once(orchestrator: &SyncOrchestrator) -> Result<()> {
    let cancel_token = CancellationToken::new();
    let on_signal = cancel_token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling sync run");
            on_signal.cancel();
        }
    });

    match orchestrator
        .run(orchestrator.defaults().clone(), cancel_token)
        .await
    {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.partial)?);
            error!("{}", failure);
            std::process::exit(1);
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
