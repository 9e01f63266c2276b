use thiserror::Error;

/// Unified error type for the proxy.
#[derive(Error, Debug)]
pub enum SwapiError {
    #[error("Invalid type: {0}. Must be people or movies")]
    InvalidKind(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Error fetching data from SWAPI: {0}")]
    Upstream(String),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Unexpected upstream payload: {0}")]
    UpstreamPayload(String),

    #[error("Resource not found")]
    NotFound,

    #[error("No stats generated yet")]
    StatsNotGenerated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl SwapiError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            SwapiError::InvalidKind(_) => 400,
            SwapiError::InvalidRequest(_) => 400,
            SwapiError::NotFound => 404,
            SwapiError::StatsNotGenerated => 404,
            SwapiError::Upstream(_) => 502,
            SwapiError::UpstreamStatus(404) => 404,
            SwapiError::UpstreamStatus(_) => 502,
            SwapiError::UpstreamPayload(_) => 502,
            _ => 500,
        }
    }

    /// JSON error body: `{"error": "<message>"}`.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
