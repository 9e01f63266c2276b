use crate::handlers;
use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use swapi_core::UpstreamClient;
use swapi_core::config::ServerConfig;
use swapi_observability::{ProxyMetrics, QueryLogger};
use swapi_resolver::EntityResolver;
use swapi_stats::{RecomputeTrigger, SnapshotStore};
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for the HTTP API.
pub struct ApiState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub resolver: Arc<EntityResolver>,
    pub query_log: Arc<QueryLogger>,
    pub snapshots: Arc<SnapshotStore>,
    pub trigger: RecomputeTrigger,
    pub metrics: Arc<ProxyMetrics>,
    /// Where the prometheus exposition is mounted when metrics are enabled.
    pub metrics_path: String,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/search", get(handlers::proxy::search))
        .route("/details/{type}/{id}", get(handlers::proxy::details))
        .route("/stats", get(handlers::stats::get_stats))
        .route("/stats/recompute", post(handlers::stats::recompute));

    let mut app = Router::new().nest("/api", api);
    if state.metrics.is_enabled() {
        app = app.route(&state.metrics_path, get(handlers::health::metrics));
    }
    app.with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn start(
    config: ServerConfig,
    state: Arc<ApiState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let mut app = build_router(state);
    if config.cors {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(addr = %listener.local_addr()?, cors = config.cors, "Starting HTTP API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP API stopped");
    Ok(())
}
