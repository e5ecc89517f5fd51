//! KATO server entry point
//!
//! Builds the storage tiers, session manager, and HTTP router, then serves
//! until SIGINT/SIGTERM.

mod error;
mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kato_core::{EngineStats, GenesConfig, SessionLimits, SessionManager, Tiers};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "kato-server", version, about = "KATO sequence-learning engine")]
struct Args {
    /// Bind host
    #[arg(long, default_value = "127.0.0.1", env = "KATO_HOST")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 8000, env = "KATO_PORT")]
    port: u16,

    /// SQLite database path backing the storage tiers
    #[arg(long, default_value = "kato.db", env = "KATO_DB_PATH")]
    db_path: PathBuf,

    /// Keep all state in memory (no persistence across restarts)
    #[arg(long)]
    in_memory: bool,

    /// Ceiling on concurrently open sessions
    #[arg(long, env = "KATO_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Default session TTL in seconds
    #[arg(long, env = "KATO_SESSION_TTL_SECONDS")]
    session_ttl_seconds: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "KATO_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let tiers = if args.in_memory {
        info!("Storage tiers: in-memory (volatile)");
        Tiers::in_memory()
    } else {
        info!(path = %args.db_path.display(), "Storage tiers: SQLite");
        Tiers::sqlite(args.db_path.clone()).context("opening storage tiers")?
    };

    let mut limits = SessionLimits::from_env();
    if let Some(max_sessions) = args.max_sessions {
        limits.max_sessions = max_sessions;
    }
    if let Some(ttl) = args.session_ttl_seconds {
        limits.default_ttl = std::time::Duration::from_secs(ttl);
    }

    let manager = Arc::new(SessionManager::new(
        tiers,
        GenesConfig::from_env(),
        limits,
        Arc::new(EngineStats::new()),
    ));
    tokio::spawn(manager.clone().run_sweeper());

    let app = routes::router(AppState::new(manager));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("parsing bind address")?;
    info!("KATO server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("KATO server shutting down");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
