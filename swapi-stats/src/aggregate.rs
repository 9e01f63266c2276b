//! Query log aggregation.
//!
//! [`compute`] is a pure function of the log content (plus the generation
//! timestamp): running it twice over the same bytes yields the same snapshot
//! apart from `generated_at`. Nothing in here returns an error; unreadable
//! input degrades to the empty snapshot.

use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swapi_core::model::{StatsSnapshot, TopQuery, now_rfc3339};
use swapi_observability::ProxyMetrics;
use tracing::{debug, info, warn};

use crate::snapshot::SnapshotStore;

/// Number of queries reported in `top_queries`.
pub const TOP_QUERIES: usize = 5;

/// The subset of a log line the aggregator looks at.
#[derive(Debug, Default, Deserialize)]
struct LogRecord {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    duration_ms: Option<f64>,
}

/// Aggregate the full content of a query log.
pub fn compute(content: &str) -> StatsSnapshot {
    compute_at(content, now_rfc3339())
}

/// Read and aggregate the log at `path`. A missing or unreadable file yields
/// the empty snapshot.
pub fn compute_file(path: &Path) -> StatsSnapshot {
    match std::fs::read(path) {
        Ok(bytes) => compute(&String::from_utf8_lossy(&bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No query log yet, producing empty snapshot");
            StatsSnapshot::empty(now_rfc3339())
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read query log, producing empty snapshot");
            StatsSnapshot::empty(now_rfc3339())
        }
    }
}

pub(crate) fn compute_at(content: &str, generated_at: String) -> StatsSnapshot {
    let mut total: u64 = 0;
    // Queries in first-occurrence order, with an index for O(1) lookups.
    let mut queries: Vec<(String, u64)> = Vec::new();
    let mut query_index: HashMap<String, usize> = HashMap::new();
    let mut duration_sum = 0.0f64;
    let mut duration_count: u64 = 0;
    let mut hours = [0u64; 24];
    let mut skipped: u64 = 0;

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(record) = parse_line(line) else {
            skipped += 1;
            continue;
        };
        total += 1;

        if let Some(query) = record.query.as_deref().map(normalize_query)
            && !query.is_empty()
        {
            match query_index.get(&query) {
                Some(&i) => queries[i].1 += 1,
                None => {
                    query_index.insert(query.clone(), queries.len());
                    queries.push((query, 1));
                }
            }
        }

        if let Some(duration) = record.duration_ms {
            duration_sum += duration;
            duration_count += 1;
        }

        if let Some(hour) = record.timestamp.as_deref().and_then(hour_of) {
            hours[hour as usize] += 1;
        }
    }

    if skipped > 0 {
        debug!(skipped, "Skipped malformed query log lines");
    }

    // Stable sort keeps first-occurrence order among equal counts.
    queries.sort_by(|a, b| b.1.cmp(&a.1));
    let top_queries = queries
        .into_iter()
        .take(TOP_QUERIES)
        .map(|(query, count)| TopQuery {
            query,
            count,
            percentage: percentage(count, total),
        })
        .collect();

    let average_duration_ms = if duration_count > 0 {
        round2(duration_sum / duration_count as f64)
    } else {
        0.0
    };

    StatsSnapshot {
        generated_at,
        total_requests: total,
        top_queries,
        average_duration_ms,
        most_popular_hour: most_popular_hour(&hours),
    }
}

/// A line is well-formed when it is a non-empty JSON object whose
/// `timestamp`/`query` are strings (or null) and `duration_ms` a number (or null).
fn parse_line(line: &str) -> Option<LogRecord> {
    let object: Map<String, Value> = serde_json::from_str(line).ok()?;
    if object.is_empty() {
        return None;
    }
    serde_json::from_value(Value::Object(object)).ok()
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Hour of day as written in the timestamp (its own UTC offset).
fn hour_of(timestamp: &str) -> Option<u8> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.hour() as u8);
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.hour() as u8)
}

/// Argmax over the histogram; ties go to the smallest hour.
fn most_popular_hour(hours: &[u64; 24]) -> Option<u8> {
    let mut best: Option<(u8, u64)> = None;
    for (hour, &count) in hours.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((hour as u8, count));
        }
    }
    best.map(|(hour, _)| hour)
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One aggregation run: read the log, compute, replace the snapshot.
pub struct StatsAggregator {
    log_path: PathBuf,
    store: Arc<SnapshotStore>,
    metrics: Arc<ProxyMetrics>,
}

impl StatsAggregator {
    pub fn new(log_path: impl Into<PathBuf>, store: Arc<SnapshotStore>, metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            log_path: log_path.into(),
            store,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Blocking: performs file I/O. Never fails; a failed snapshot write
    /// leaves the previous snapshot in place and is only logged.
    pub fn run(&self) -> StatsSnapshot {
        let snapshot = compute_file(&self.log_path);
        match self.store.write(&snapshot) {
            Ok(()) => info!(
                total_requests = snapshot.total_requests,
                top_queries = snapshot.top_queries.len(),
                path = %self.store.path().display(),
                "Stats snapshot written"
            ),
            Err(e) => warn!(
                error = %e,
                path = %self.store.path().display(),
                "Failed to write stats snapshot, previous snapshot kept"
            ),
        }
        self.metrics.record_aggregation(snapshot.total_requests);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATED: &str = "2025-01-15T00:00:00.000Z";

    fn line(timestamp: &str, query: Option<&str>, duration: f64) -> String {
        let endpoint = if query.is_some() { "search" } else { "details" };
        let mut v = serde_json::json!({
            "timestamp": timestamp,
            "endpoint": endpoint,
            "type": "people",
            "duration_ms": duration,
            "success": true,
        });
        match query {
            Some(q) => v["query"] = Value::from(q),
            None => v["id"] = Value::from(1u64),
        }
        v.to_string()
    }

    fn log(lines: &[String]) -> String {
        lines.join("\n") + "\n"
    }

    fn at(content: &str) -> StatsSnapshot {
        compute_at(content, GENERATED.to_string())
    }

    // ── Core scenarios ───────────────────────────────────────────

    #[test]
    fn case_insensitive_queries_are_merged() {
        let content = log(&[
            line("2025-01-15T10:00:00.000Z", Some("luke"), 100.0),
            line("2025-01-15T10:05:00.000Z", Some("Luke"), 200.0),
            line("2025-01-15T11:00:00.000Z", Some("vader"), 300.0),
        ]);
        let snap = at(&content);
        assert_eq!(snap.total_requests, 3);
        assert_eq!(
            snap.top_queries,
            vec![
                TopQuery { query: "luke".into(), count: 2, percentage: 66.67 },
                TopQuery { query: "vader".into(), count: 1, percentage: 33.33 },
            ]
        );
        assert_eq!(snap.average_duration_ms, 200.0);
        assert_eq!(snap.most_popular_hour, Some(10));
    }

    #[test]
    fn empty_content_yields_zeroed_snapshot() {
        let snap = at("");
        assert_eq!(snap, StatsSnapshot::empty(GENERATED));
    }

    #[test]
    fn missing_file_yields_zeroed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snap = compute_file(&dir.path().join("missing.log"));
        assert_eq!(snap.total_requests, 0);
        assert!(snap.top_queries.is_empty());
        assert_eq!(snap.average_duration_ms, 0.0);
        assert_eq!(snap.most_popular_hour, None);
    }

    #[test]
    fn unreadable_path_yields_zeroed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        // Reading a directory fails with something other than NotFound.
        let snap = compute_file(dir.path());
        assert_eq!(snap.total_requests, 0);
    }

    // ── Parsing ──────────────────────────────────────────────────

    #[test]
    fn malformed_lines_are_skipped() {
        let content = [
            line("2025-01-15T10:00:00Z", Some("luke"), 10.0),
            "not json".to_string(),
            "{\"truncated\": ".to_string(),
            "{}".to_string(),
            "[1, 2, 3]".to_string(),
            "42".to_string(),
            r#"{"query": 7, "duration_ms": 1}"#.to_string(),
            r#"{"duration_ms": "slow"}"#.to_string(),
            String::new(),
            "   ".to_string(),
            line("2025-01-15T10:00:00Z", Some("leia"), 30.0),
        ]
        .join("\n");
        let snap = at(&content);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.average_duration_ms, 20.0);
    }

    #[test]
    fn non_utf8_bytes_do_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.log");
        let mut bytes = line("2025-01-15T10:00:00Z", Some("luke"), 10.0).into_bytes();
        bytes.extend_from_slice(b"\n\xff\xfe garbage\n");
        std::fs::write(&path, bytes).unwrap();
        let snap = compute_file(&path);
        assert_eq!(snap.total_requests, 1);
    }

    #[test]
    fn lines_without_query_count_only_toward_total() {
        let content = log(&[
            line("2025-01-15T10:00:00Z", None, 10.0),
            line("2025-01-15T10:00:00Z", None, 10.0),
            line("2025-01-15T10:00:00Z", Some("luke"), 10.0),
            r#"{"query": "   ", "duration_ms": 10}"#.to_string(),
        ]);
        let snap = at(&content);
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.top_queries.len(), 1);
        assert_eq!(snap.top_queries[0].percentage, 25.0);
    }

    #[test]
    fn failed_requests_still_count() {
        let content = r#"{"timestamp":"2025-01-15T10:00:00Z","endpoint":"search","type":"people","query":"x","duration_ms":5,"success":false}"#;
        assert_eq!(at(content).total_requests, 1);
    }

    // ── Top queries ──────────────────────────────────────────────

    #[test]
    fn top_queries_are_limited_to_five() {
        let queries = ["a", "b", "c", "d", "e", "f", "g"];
        let lines: Vec<String> = queries
            .iter()
            .map(|q| line("2025-01-15T10:00:00Z", Some(q), 1.0))
            .collect();
        let snap = at(&log(&lines));
        assert_eq!(snap.top_queries.len(), TOP_QUERIES);
    }

    #[test]
    fn ties_keep_first_occurrence_order() {
        let order = ["yoda", "han", "leia", "luke", "chewie", "lando", "han", "luke"];
        let lines: Vec<String> = order
            .iter()
            .map(|q| line("2025-01-15T10:00:00Z", Some(q), 1.0))
            .collect();
        let snap = at(&log(&lines));
        let names: Vec<&str> = snap.top_queries.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(names, vec!["han", "luke", "yoda", "leia", "chewie"]);
    }

    #[test]
    fn queries_are_trimmed_and_lowercased() {
        let content = log(&[
            line("2025-01-15T10:00:00Z", Some("  Darth Vader "), 1.0),
            line("2025-01-15T10:00:00Z", Some("DARTH VADER"), 1.0),
            line("2025-01-15T10:00:00Z", Some("Ÿoda"), 1.0),
        ]);
        let snap = at(&content);
        assert_eq!(snap.top_queries[0].query, "darth vader");
        assert_eq!(snap.top_queries[0].count, 2);
        assert_eq!(snap.top_queries[1].query, "ÿoda");
    }

    // ── Durations ────────────────────────────────────────────────

    #[test]
    fn average_only_covers_entries_with_duration() {
        let content = log(&[
            r#"{"query": "a", "duration_ms": 1.0}"#.to_string(),
            r#"{"query": "b", "duration_ms": 2.0}"#.to_string(),
            r#"{"query": "c"}"#.to_string(),
            r#"{"query": "d", "duration_ms": null}"#.to_string(),
        ]);
        let snap = at(&content);
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.average_duration_ms, 1.5);
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let content = log(&[
            r#"{"duration_ms": 1.0}"#.to_string(),
            r#"{"duration_ms": 1.0}"#.to_string(),
            r#"{"duration_ms": 2.0}"#.to_string(),
        ]);
        assert_eq!(at(&content).average_duration_ms, 1.33);
    }

    #[test]
    fn no_durations_means_zero_average() {
        let snap = at(r#"{"query": "a"}"#);
        assert_eq!(snap.average_duration_ms, 0.0);
    }

    // ── Hours ────────────────────────────────────────────────────

    #[test]
    fn hour_ties_go_to_the_smallest_hour() {
        let content = log(&[
            line("2025-01-15T18:00:00Z", None, 1.0),
            line("2025-01-15T07:00:00Z", None, 1.0),
            line("2025-01-15T18:30:00Z", None, 1.0),
            line("2025-01-15T07:45:00Z", None, 1.0),
        ]);
        assert_eq!(at(&content).most_popular_hour, Some(7));
    }

    #[test]
    fn hour_is_taken_as_written_with_offsets_and_fractions() {
        assert_eq!(hour_of("2025-01-15T23:30:00+02:00"), Some(23));
        assert_eq!(hour_of("2025-01-15T05:01:02.123456Z"), Some(5));
        assert_eq!(hour_of("2025-01-15T05:01:02"), Some(5));
        assert_eq!(hour_of("yesterday"), None);
    }

    #[test]
    fn no_timestamps_means_null_hour() {
        let content = log(&[
            r#"{"query": "a", "duration_ms": 1}"#.to_string(),
            r#"{"query": "b", "timestamp": "not a time"}"#.to_string(),
        ]);
        let snap = at(&content);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.most_popular_hour, None);
    }

    // ── Determinism ──────────────────────────────────────────────

    #[test]
    fn repeated_runs_are_byte_identical_except_generated_at() {
        let content = log(&[
            line("2025-01-15T10:00:00Z", Some("luke"), 12.345),
            line("2025-01-15T11:00:00Z", Some("leia"), 7.5),
            line("2025-01-15T11:00:00Z", Some("han"), 1.0),
            line("2025-01-15T12:00:00Z", None, 3.0),
        ]);
        let mut first = compute(&content);
        let mut second = compute(&content);
        first.generated_at = String::new();
        second.generated_at = String::new();
        assert_eq!(
            serde_json::to_vec_pretty(&first).unwrap(),
            serde_json::to_vec_pretty(&second).unwrap()
        );
    }

    #[test]
    fn percentage_with_zero_total_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
    }
}
