//! Data model shared by the proxy, the query log, and the aggregator.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SwapiError;

/// Entity category served by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    People,
    Movies,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::People, Kind::Movies];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::People => "people",
            Kind::Movies => "movies",
        }
    }

    /// Path segment used by the upstream API (`/people/…`, `/films/…`).
    pub fn upstream_path(&self) -> &'static str {
        match self {
            Kind::People => "people",
            Kind::Movies => "films",
        }
    }

    /// Record field carrying the human-readable name.
    pub fn display_field(&self) -> &'static str {
        match self {
            Kind::People => "name",
            Kind::Movies => "title",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = SwapiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "people" => Ok(Kind::People),
            "movies" => Ok(Kind::Movies),
            other => Err(SwapiError::InvalidKind(other.to_string())),
        }
    }
}

/// Which proxy endpoint served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Search,
    Details,
}

/// One line of the append-only query log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub endpoint: Endpoint,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub duration_ms: f64,
    pub success: bool,
}

impl LogEntry {
    pub fn search(kind: Kind, query: impl Into<String>, duration_ms: f64, success: bool) -> Self {
        Self {
            timestamp: now_rfc3339(),
            endpoint: Endpoint::Search,
            kind,
            query: Some(query.into()),
            id: None,
            duration_ms,
            success,
        }
    }

    pub fn details(kind: Kind, id: u64, duration_ms: f64, success: bool) -> Self {
        Self {
            timestamp: now_rfc3339(),
            endpoint: Endpoint::Details,
            kind,
            query: None,
            id: Some(id),
            duration_ms,
            success,
        }
    }

    /// Serialise to a compact JSON line (no trailing newline).
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A normalized query and its share of all requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopQuery {
    pub query: String,
    pub count: u64,
    pub percentage: f64,
}

/// Aggregate report derived from the whole query log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub generated_at: String,
    pub total_requests: u64,
    pub top_queries: Vec<TopQuery>,
    pub average_duration_ms: f64,
    pub most_popular_hour: Option<u8>,
}

impl StatsSnapshot {
    /// The zeroed report produced for an empty or missing log.
    pub fn empty(generated_at: impl Into<String>) -> Self {
        Self {
            generated_at: generated_at.into(),
            total_requests: 0,
            top_queries: Vec::new(),
            average_duration_ms: 0.0,
            most_popular_hour: None,
        }
    }
}

/// A relation reference resolved to its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    pub id: String,
    pub display_name: String,
}

/// Current UTC time as RFC 3339 with millisecond precision, e.g.
/// `2025-01-15T10:04:05.123Z`.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
