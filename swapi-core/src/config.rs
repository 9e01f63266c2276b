use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub query_log: QueryLogConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
    /// Allow cross-origin requests from the separately hosted frontend.
    #[serde(default = "default_true")]
    pub cors: bool,
}

/// Upstream dataset API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_ms: u64,
    /// Page size requested while crawling listings.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

/// Entity resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for a single listing-page fetch during a crawl.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_ms: u64,
    /// Crawl both kinds in the background right after start-up.
    #[serde(default)]
    pub warm_on_startup: bool,
}

/// Append-only query log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_query_log_path")]
    pub path: PathBuf,
    /// Maximum number of entries written per file write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_true")]
    pub schedule_enabled: bool,
    #[serde(default = "default_recompute_interval")]
    pub recompute_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When false, no prometheus counters are updated.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_server_addr() -> String { "0.0.0.0:8000".into() }
fn default_base_url() -> String { "https://www.swapi.tech/api".into() }
fn default_upstream_timeout() -> u64 { 10_000 }
fn default_page_limit() -> u32 { 100 }
fn default_page_timeout() -> u64 { 15_000 }
fn default_true() -> bool { true }
fn default_query_log_path() -> PathBuf { PathBuf::from("storage/app/swapi_queries.log") }
fn default_snapshot_path() -> PathBuf { PathBuf::from("storage/app/swapi_stats.json") }
fn default_batch_size() -> usize { 256 }
fn default_recompute_interval() -> u64 { 300 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            cors: true,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_upstream_timeout(),
            page_limit: default_page_limit(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            page_timeout_ms: default_page_timeout(),
            warm_on_startup: false,
        }
    }
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_query_log_path(),
            batch_size: default_batch_size(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ResolverConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            schedule_enabled: true,
            recompute_interval_secs: default_recompute_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from YAML file + `SWAPI_` env overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `SWAPI_STATS__RECOMPUTE_INTERVAL_SECS=60`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SWAPI_").split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.stats.recompute_interval_secs.max(1))
    }
}
