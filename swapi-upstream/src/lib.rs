//! HTTP client for the upstream dataset API (`swapi.tech` shape).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use swapi_core::config::UpstreamConfig;
use swapi_core::upstream::{ListingPage, UpstreamClient, unwrap_detail};
use swapi_core::{Kind, SwapiError};
use tracing::debug;

/// reqwest-backed [`UpstreamClient`].
///
/// Every request is bounded by the configured timeout; a timeout surfaces as
/// an ordinary [`SwapiError::Upstream`] failure.
#[derive(Clone)]
pub struct SwapiClient {
    client: Client,
    base_url: String,
    page_limit: u32,
}

impl SwapiClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, SwapiError> {
        let client = Client::builder()
            .user_agent(concat!("swapi-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| SwapiError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit.max(1),
        })
    }

    fn collection_url(&self, kind: Kind) -> String {
        format!("{}/{}", self.base_url, kind.upstream_path())
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, SwapiError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| SwapiError::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Upstream returned non-success status");
            return Err(SwapiError::UpstreamStatus(status.as_u16()));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| SwapiError::UpstreamPayload(e.to_string()))
    }
}

#[async_trait]
impl UpstreamClient for SwapiClient {
    async fn search(&self, kind: Kind, query: &str) -> Result<Value, SwapiError> {
        let url = self.collection_url(kind);
        self.get_json(&url, &[("name", query.to_string())]).await
    }

    async fn details(&self, kind: Kind, id: u64) -> Result<Value, SwapiError> {
        let url = format!("{}/{}", self.collection_url(kind), id);
        let body = self.get_json(&url, &[]).await?;
        Ok(unwrap_detail(body))
    }

    async fn list_page(&self, kind: Kind, page: u32) -> Result<ListingPage, SwapiError> {
        let url = self.collection_url(kind);
        let body = self
            .get_json(
                &url,
                &[("page", page.to_string()), ("limit", self.page_limit.to_string())],
            )
            .await?;
        ListingPage::from_json(kind, &body)
    }
}
