use crate::server::ApiState;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use serde_json::{Value, json};
use std::sync::Arc;
use swapi_core::model::now_rfc3339;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint handler.
pub async fn metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
