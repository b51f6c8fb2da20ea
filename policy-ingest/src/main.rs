//! policy-ingest - Insurance policy ingestion and query service
//!
//! Startup:
//! 1. Parse CLI, load the bootstrap TOML (explicit path, user config, system config)
//! 2. Install tracing (`RUST_LOG` wins over `logging.level`)
//! 3. Resolve root folder and open the database
//! 4. Build the LLM client when an API key is configured
//! 5. Serve until Ctrl+C / SIGTERM

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use policy_common::config::{load_or_default, resolve_root_folder};
use policy_ingest::config::Settings;
use policy_ingest::query::{GeminiClient, LlmClient};
use policy_ingest::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for policy-ingest
#[derive(Parser, Debug)]
#[command(name = "policy-ingest")]
#[command(about = "Insurance policy spreadsheet ingestion and query service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "POLICY_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides TOML)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting policy-ingest v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    info!("Root folder: {}", root_folder.display());

    let mut settings = Settings::resolve(&toml_config, &root_folder);
    if let Some(port) = args.port {
        settings.port = port;
    }

    info!("Database: {}", settings.database_path.display());
    let db_pool = policy_common::db::init_database(&settings.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let llm: Option<Arc<dyn LlmClient>> = match &settings.llm_api_key {
        Some(key) => {
            let client: Arc<dyn LlmClient> = Arc::new(
                GeminiClient::new(key.clone(), &settings.llm).context("Failed to build LLM client")?,
            );
            Some(client)
        }
        None => None,
    };

    let port = settings.port;
    let app = build_router(AppState::new(db_pool, settings, llm));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
