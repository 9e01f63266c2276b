//! Search and details proxy handlers.
//!
//! Both measure the upstream round trip, append one query log entry (success
//! or not) and record request metrics before answering.

use crate::error::ApiError;
use crate::server::ApiState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swapi_core::{Endpoint, Kind, LogEntry, ResolvedRef, SwapiError};
use tracing::{debug, warn};

const SEARCH_FAILED: &str = "Error fetching data from SWAPI";
const NOT_FOUND: &str = "Resource not found";

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub query: Option<String>,
}

pub async fn search(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(kind) = params.kind.as_deref() else {
        return Err(SwapiError::InvalidRequest("The type field is required".into()).into());
    };
    let kind: Kind = kind.parse()?;
    let query = params.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(SwapiError::InvalidRequest("The query field is required".into()).into());
    }

    let started = Instant::now();
    let result = state.upstream.search(kind, query).await;
    let elapsed = started.elapsed();

    state.query_log.append(LogEntry::search(
        kind,
        query,
        duration_ms(elapsed),
        result.is_ok(),
    ));
    state
        .metrics
        .record_request(Endpoint::Search, kind, result.is_ok(), elapsed.as_secs_f64());

    match result {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            warn!(kind = %kind, query, error = %e, "Upstream search failed");
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, SEARCH_FAILED))
        }
    }
}

pub async fn details(
    State(state): State<Arc<ApiState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind: Kind = kind.parse()?;
    let id: u64 = id
        .parse()
        .map_err(|_| SwapiError::InvalidRequest(format!("Invalid id: {id}")))?;

    let started = Instant::now();
    let result = state.upstream.details(kind, id).await;
    let elapsed = started.elapsed();

    state.query_log.append(LogEntry::details(
        kind,
        id,
        duration_ms(elapsed),
        result.is_ok(),
    ));
    state
        .metrics
        .record_request(Endpoint::Details, kind, result.is_ok(), elapsed.as_secs_f64());

    let mut record = match result {
        Ok(record) => record,
        Err(e) => {
            debug!(kind = %kind, id, error = %e, "Upstream details failed");
            return Err(ApiError::new(StatusCode::NOT_FOUND, NOT_FOUND));
        }
    };

    // films list characters (people), people list films (movies).
    let (field, related) = match kind {
        Kind::Movies => ("characters", Kind::People),
        Kind::People => ("films", Kind::Movies),
    };
    if let Some(Value::Array(refs)) = record.get(field) {
        let refs: Vec<&str> = refs.iter().filter_map(Value::as_str).collect();
        let resolved = state.resolver.resolve(related, &refs).await;
        record[field] = resolved_json(related, resolved);
    }

    Ok(Json(record))
}

/// `[{"id": …, "name": …}]` for people, `[{"id": …, "title": …}]` for movies.
fn resolved_json(kind: Kind, resolved: Vec<ResolvedRef>) -> Value {
    let field = kind.display_field();
    Value::Array(
        resolved
            .into_iter()
            .map(|r| {
                let mut item = Map::new();
                item.insert("id".into(), Value::String(r.id));
                item.insert(field.into(), Value::String(r.display_name));
                Value::Object(item)
            })
            .collect(),
    )
}

/// Milliseconds rounded to two decimals.
fn duration_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn durations_are_rounded_to_two_decimals() {
        assert_eq!(duration_ms(Duration::from_micros(12_346)), 12.35);
        assert_eq!(duration_ms(Duration::from_millis(200)), 200.0);
        assert_eq!(duration_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn resolved_lists_use_the_kind_display_field() {
        let refs = vec![ResolvedRef { id: "1".into(), display_name: "A New Hope".into() }];
        assert_eq!(
            resolved_json(Kind::Movies, refs.clone()),
            json!([{ "id": "1", "title": "A New Hope" }])
        );
        assert_eq!(
            resolved_json(Kind::People, refs),
            json!([{ "id": "1", "name": "A New Hope" }])
        );
    }
}
