use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use swapi_core::model::{Endpoint, Kind};

/// Metrics collector. All counters are gated behind `enabled`.
///
/// When disabled no registry is created and every `record_*` call returns
/// immediately, so the collector can be passed around unconditionally.
pub struct ProxyMetrics {
    enabled: bool,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub request_duration: Option<HistogramVec>,
    pub aggregation_runs: Option<IntCounter>,
    pub snapshot_requests: Option<IntGauge>,
    pub crawl_pages: Option<IntCounterVec>,
    pub query_log_events: Option<IntCounterVec>,
}

impl ProxyMetrics {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Proxied requests").namespace("swapi"),
            &["endpoint", "type", "outcome"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("proxy_request_duration_seconds", "Upstream round-trip latency")
                .namespace("swapi")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;

        let aggregation_runs = IntCounter::with_opts(
            Opts::new("aggregation_runs_total", "Completed stats aggregation runs").namespace("swapi"),
        )?;

        let snapshot_requests = IntGauge::with_opts(
            Opts::new("snapshot_total_requests", "total_requests in the latest snapshot")
                .namespace("swapi"),
        )?;

        let crawl_pages = IntCounterVec::new(
            Opts::new("crawl_pages_total", "Listing pages requested by resolver crawls")
                .namespace("swapi"),
            &["type", "outcome"],
        )?;

        let query_log_events = IntCounterVec::new(
            Opts::new("query_log_events_total", "Query log write outcomes").namespace("swapi"),
            &["event"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(aggregation_runs.clone()))?;
        registry.register(Box::new(snapshot_requests.clone()))?;
        registry.register(Box::new(crawl_pages.clone()))?;
        registry.register(Box::new(query_log_events.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            requests_total: Some(requests_total),
            request_duration: Some(request_duration),
            aggregation_runs: Some(aggregation_runs),
            snapshot_requests: Some(snapshot_requests),
            crawl_pages: Some(crawl_pages),
            query_log_events: Some(query_log_events),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            requests_total: None,
            request_duration: None,
            aggregation_runs: None,
            snapshot_requests: None,
            crawl_pages: None,
            query_log_events: None,
        }
    }

    /// Record a proxied request (no-op when disabled).
    #[inline]
    pub fn record_request(&self, endpoint: Endpoint, kind: Kind, success: bool, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        let endpoint = endpoint_label(endpoint);
        if let Some(ref counter) = self.requests_total {
            let outcome = if success { "ok" } else { "error" };
            counter
                .with_label_values(&[endpoint, kind.as_str(), outcome])
                .inc();
        }
        if let Some(ref hist) = self.request_duration {
            hist.with_label_values(&[endpoint]).observe(duration_secs);
        }
    }

    #[inline]
    pub fn record_aggregation(&self, total_requests: u64) {
        if let Some(ref runs) = self.aggregation_runs {
            runs.inc();
        }
        if let Some(ref gauge) = self.snapshot_requests {
            gauge.set(i64::try_from(total_requests).unwrap_or(i64::MAX));
        }
    }

    #[inline]
    pub fn record_crawl_page(&self, kind: Kind, success: bool) {
        if let Some(ref counter) = self.crawl_pages {
            let outcome = if success { "ok" } else { "failed" };
            counter.with_label_values(&[kind.as_str(), outcome]).inc();
        }
    }

    /// Count a query-log event: `written`, `dropped`, or `write_failed`.
    #[inline]
    pub fn record_query_log(&self, event: &str, n: u64) {
        if let Some(ref counter) = self.query_log_events {
            counter.with_label_values(&[event]).inc_by(n);
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::disabled()
    }
}

fn endpoint_label(endpoint: Endpoint) -> &'static str {
    match endpoint {
        Endpoint::Search => "search",
        Endpoint::Details => "details",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Disabled collector ───────────────────────────────────────

    #[test]
    fn disabled_collector_has_no_fields() {
        let mc = ProxyMetrics::new(false).unwrap();
        assert!(!mc.is_enabled());
        assert!(mc.requests_total.is_none());
        assert!(mc.crawl_pages.is_none());
        assert_eq!(mc.render(), "");
    }

    #[test]
    fn disabled_collector_records_without_panicking() {
        let mc = ProxyMetrics::disabled();
        mc.record_request(Endpoint::Search, Kind::People, true, 0.01);
        mc.record_aggregation(10);
        mc.record_crawl_page(Kind::Movies, false);
        mc.record_query_log("dropped", 1);
    }

    // ── Enabled collector ────────────────────────────────────────

    #[test]
    fn request_counter_is_labelled_by_endpoint_type_outcome() {
        let mc = ProxyMetrics::new(true).unwrap();
        mc.record_request(Endpoint::Search, Kind::People, true, 0.01);
        mc.record_request(Endpoint::Search, Kind::People, true, 0.02);
        mc.record_request(Endpoint::Details, Kind::Movies, false, 0.5);

        let counter = mc.requests_total.as_ref().unwrap();
        assert_eq!(counter.with_label_values(&["search", "people", "ok"]).get(), 2);
        assert_eq!(counter.with_label_values(&["details", "movies", "error"]).get(), 1);
    }

    #[test]
    fn aggregation_updates_counter_and_gauge() {
        let mc = ProxyMetrics::new(true).unwrap();
        mc.record_aggregation(7);
        mc.record_aggregation(9);
        assert_eq!(mc.aggregation_runs.as_ref().unwrap().get(), 2);
        assert_eq!(mc.snapshot_requests.as_ref().unwrap().get(), 9);
    }

    #[test]
    fn render_contains_namespaced_metrics() {
        let mc = ProxyMetrics::new(true).unwrap();
        mc.record_request(Endpoint::Search, Kind::People, true, 0.01);
        mc.record_crawl_page(Kind::People, true);
        mc.record_query_log("written", 3);
        let output = mc.render();
        assert!(output.contains("swapi_proxy_requests_total"));
        assert!(output.contains("swapi_crawl_pages_total"));
        assert!(output.contains("swapi_query_log_events_total"));
    }
}
