//! tabdeath daemon
//!
//! Serves the message API over HTTP (and optionally a Unix socket) and runs
//! daily maintenance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tabdeath_core::{Clock, SqliteStore, SystemClock, TabDeathConfig};
use tabdeath_server::{serve, socket, spawn_maintenance, AppState};

#[derive(Parser, Debug)]
#[command(name = "tabdeathd", version, about = "Closed-tab tracker daemon")]
struct Args {
    /// SQLite database file
    #[arg(long, env = "TABDEATH_DB")]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, env = "TABDEATH_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides `server.addr`
    #[arg(long, env = "TABDEATH_ADDR")]
    addr: Option<String>,

    /// Unix socket path, overrides `server.socket_path`
    #[arg(long, env = "TABDEATH_SOCKET")]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match args.config.or_else(TabDeathConfig::default_path) {
        Some(path) => TabDeathConfig::load(&path)?,
        None => TabDeathConfig::default(),
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(socket) = args.socket {
        config.server.socket_path = Some(socket);
    }
    config.validate()?;

    let db_path = args
        .db
        .or_else(TabDeathConfig::default_db_path)
        .ok_or("no database path given and no data directory available")?;

    let store = match SqliteStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, db = %db_path.display(), "failed to open store");
            return Err(e.into());
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::new(store, &config, clock));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %db_path.display(),
        addr = %config.server.addr,
        auth = state.api_token.is_some(),
        "tabdeath starting"
    );

    let maintenance = spawn_maintenance(
        Arc::clone(&state),
        Duration::from_secs(config.maintenance.interval_hours * 3600),
    );

    if let Some(path) = config.server.socket_path.clone() {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = socket::serve_unix_socket(&path, state).await {
                tracing::error!(error = %e, "Unix socket server stopped");
            }
        });
    }

    let result = serve(&config.server.addr, state, shutdown_signal()).await;
    maintenance.abort();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutting down");
}
