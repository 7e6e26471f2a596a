//! tabdeath server
//!
//! Hosts the core services behind the message API (HTTP and Unix socket),
//! ingests tab events from the browser extension and runs maintenance on a
//! schedule.

pub mod auth;
pub mod http;
pub mod ingest;
pub mod socket;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tabdeath_core::{
    CaptureService, Clock, ExportService, MaintenanceService, SqliteStore, TabDeathConfig,
};

use ingest::{HostOutbox, Ingestor};

/// Delay before the first scheduled maintenance run.
const FIRST_MAINTENANCE_DELAY: Duration = Duration::from_secs(30);

/// Shared application state
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub clock: Arc<dyn Clock>,
    pub capture: Arc<CaptureService>,
    pub maintenance: Arc<MaintenanceService>,
    pub export: ExportService,
    pub ingestor: Ingestor,
    pub outbox: Arc<HostOutbox>,
    pub api_token: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, config: &TabDeathConfig, clock: Arc<dyn Clock>) -> Self {
        let capture = Arc::new(CaptureService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.stars,
        ));
        let maintenance = Arc::new(MaintenanceService::new(
            Arc::clone(&store),
            config.decay,
            config.cap,
            config.compaction,
            config.maintenance,
        ));
        let export = ExportService::new(Arc::clone(&store), Arc::clone(&clock));
        let outbox = Arc::new(HostOutbox::new());
        let ingestor = Ingestor::new(
            &config.ingest,
            Arc::clone(&capture),
            outbox.clone(),
            Arc::clone(&clock),
        );

        Self {
            store,
            clock,
            capture,
            maintenance,
            export,
            ingestor,
            outbox,
            api_token: config
                .server
                .api_token
                .clone()
                .filter(|token| !token.is_empty()),
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/messages", post(http::post_message))
        .route("/status", get(http::get_status))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_token,
        ))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("tabdeath server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    state.ingestor.dispose().await;
    Ok(())
}

/// Run daily maintenance every `interval`, starting shortly after startup.
///
/// A failed run is logged and the schedule continues.
pub fn spawn_maintenance(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    spawn_maintenance_after(state, FIRST_MAINTENANCE_DELAY, interval)
}

fn spawn_maintenance_after(
    state: Arc<AppState>,
    first: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + first;
        let mut ticker = tokio::time::interval_at(start, interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let maintenance = Arc::clone(&state.maintenance);
            let now = state.clock.now();
            match tokio::task::spawn_blocking(move || maintenance.run_daily_maintenance(now)).await
            {
                Ok(Ok(_report)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "scheduled maintenance failed"),
                Err(e) => tracing::error!(error = %e, "scheduled maintenance task panicked"),
            }
        }
    })
}
