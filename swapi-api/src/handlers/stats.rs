use crate::error::ApiError;
use crate::server::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value, json};
use std::sync::Arc;
use swapi_core::{StatsSnapshot, SwapiError};
use swapi_stats::TriggerOutcome;
use tracing::{info, warn};

/// Latest completed snapshot, or 404 before the first aggregation run.
///
/// The file is checked on every request so a snapshot written by another
/// process is picked up.
pub async fn get_stats(State(state): State<Arc<ApiState>>) -> Result<Json<StatsSnapshot>, ApiError> {
    let store = Arc::clone(&state.snapshots);
    let snapshot = tokio::task::spawn_blocking(move || store.read_latest())
        .await
        .map_err(|e| SwapiError::Internal(e.to_string()))??;
    Ok(Json(StatsSnapshot::clone(&snapshot)))
}

/// Ask for a recompute. Returns immediately; the run happens in the background.
pub async fn recompute(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    match state.trigger.trigger() {
        TriggerOutcome::Queued => {
            info!("Stats recompute queued");
            (StatusCode::ACCEPTED, Json(json!({ "status": "queued" })))
        }
        TriggerOutcome::Coalesced => (StatusCode::ACCEPTED, Json(json!({ "status": "coalesced" }))),
        TriggerOutcome::Closed => {
            warn!("Recompute requested but the worker has stopped");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Stats worker unavailable" })),
            )
        }
    }
}
