//! Contract with the upstream dataset API.
//!
//! The proxy never talks HTTP directly from its core: the resolver and the API
//! handlers go through [`UpstreamClient`], which `swapi-upstream` implements
//! with reqwest and tests implement with in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SwapiError;
use crate::model::Kind;

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Search a kind by name; the upstream body is returned untouched.
    async fn search(&self, kind: Kind, query: &str) -> Result<Value, SwapiError>;

    /// Fetch a single record, already unwrapped with [`unwrap_detail`].
    async fn details(&self, kind: Kind, id: u64) -> Result<Value, SwapiError>;

    /// Fetch one page (1-based) of the full listing for a kind.
    async fn list_page(&self, kind: Kind, page: u32) -> Result<ListingPage, SwapiError>;
}

/// One `uid → name` pair from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub uid: String,
    pub name: String,
}

/// Decoded listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    /// Total page count reported by the upstream (1 when not reported).
    pub total_pages: u32,
}

impl ListingPage {
    /// Decode a listing body.
    ///
    /// Accepts the paginated `{"total_pages": N, "results": [{uid, name}]}`
    /// shape as well as the unpaginated `{"result": [{uid, properties: {title}}]}`
    /// shape. Items missing an id or a name are skipped.
    pub fn from_json(kind: Kind, body: &Value) -> Result<Self, SwapiError> {
        let items = body
            .get("results")
            .and_then(Value::as_array)
            .or_else(|| body.get("result").and_then(Value::as_array))
            .ok_or_else(|| SwapiError::UpstreamPayload("listing has no results array".into()))?;

        let entries = items
            .iter()
            .filter_map(|item| {
                let uid = scalar_string(item.get("uid").or_else(|| item.get("_id"))?)?;
                let name = display_name(kind, item)?;
                Some(ListingEntry { uid, name })
            })
            .collect();

        let total_pages = body
            .get("total_pages")
            .and_then(Value::as_u64)
            .map(|n| n.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(1);

        Ok(Self {
            entries,
            total_pages,
        })
    }
}

/// Pick the display name of a listing item, looking inside `properties` first.
///
/// Movies prefer `title`, people prefer `name`; the other field is a fallback.
pub fn display_name(kind: Kind, item: &Value) -> Option<String> {
    let fallback = match kind {
        Kind::People => "title",
        Kind::Movies => "name",
    };
    let sources = [item.get("properties"), Some(item)];
    for source in sources.into_iter().flatten() {
        for field in [kind.display_field(), fallback] {
            if let Some(name) = source.get(field).and_then(Value::as_str)
                && !name.is_empty()
            {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Unwrap a detail body from `result.properties` when present.
pub fn unwrap_detail(mut body: Value) -> Value {
    match body.pointer_mut("/result/properties") {
        Some(properties) => properties.take(),
        None => body,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
