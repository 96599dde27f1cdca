//! Upload guard (v1)
//!
//! Serves the upload directory of the language-school admin application.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ trace ─▶ timeout ─▶ concurrency limit
//!                                                            │
//!                          ┌─────────────────────────────────┘
//!                          ▼
//!                   /health ─▶ {"success":true}
//!                   /uploads/* ─▶ path guard ─▶ download limiter ─▶ ServeDir
//!                                   │                │
//!                                 403/404           429
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use upload_guard::config::{load_config, validate_config, ConfigError, GuardConfig};
use upload_guard::lifecycle::wait_for_signal;
use upload_guard::observability::{logging, metrics};
use upload_guard::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "upload-guard", version, about = "Guarded file server for uploaded lecture resources")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the upload root directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Override the bind address.
    #[arg(long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<GuardConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.uploads.root_dir = root.clone();
    }
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "upload-guard starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upload_root = %config.uploads.root_dir.display(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
