//! PersonalizeAI API service
//!
//! HTTP service for subscriber engagement scoring, personalization outcome
//! tracking, and A/B test evaluation.

use anyhow::{Context, Result};
use clap::Parser;
use pzai_api::{build_router, cors_layer, AppState};
use pzai_common::config::{load_toml_config, resolve_config_path, ConfigOverrides, ServiceConfig, TomlConfig};
use pzai_common::db::init_database;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pzai-api
#[derive(Parser, Debug)]
#[command(name = "pzai-api")]
#[command(about = "PersonalizeAI newsletter personalization API")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = "PZAI_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PZAI_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "PZAI_DATABASE")]
    database: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "PZAI_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting PersonalizeAI API (pzai-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let toml_config = match resolve_config_path(args.config.as_deref()) {
        Some(path) => load_toml_config(&path)?,
        None => TomlConfig::default(),
    };
    let config = ServiceConfig::resolve(
        ConfigOverrides {
            host: args.host,
            port: args.port,
            database_path: args.database,
        },
        toml_config,
    );

    info!("Database: {}", config.database_path.display());
    let pool = init_database(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;

    let app = build_router(AppState::new(pool)).layer(cors_layer(&config));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
