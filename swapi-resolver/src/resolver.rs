//! Entity resolution cache.
//!
//! One [`EntityResolver`] is built at process start and shared behind an `Arc`.
//! It keeps, per [`Kind`], a map from upstream uid to display name. The map is
//! filled by a single paginated crawl of the upstream listing the first time
//! that kind is needed, and never refreshed afterwards.
//!
//! Crawl policy:
//! - pages are fetched in order from 1 until the reported `total_pages`;
//! - the first failing page (error or timeout) ends the crawl, and whatever was
//!   collected so far is kept;
//! - the kind counts as attempted once the crawl has been started, complete or
//!   not, so a partial cache is never re-crawled in the same process;
//! - the crawl runs on its own task; callers only wait for its summary, so a
//!   caller that is dropped midway leaves the crawl running for the others.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use swapi_core::config::ResolverConfig;
use swapi_core::{Kind, ResolvedRef, UpstreamClient};
use swapi_observability::ProxyMetrics;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::reference::extract_id;

/// Hard stop for a misbehaving upstream that reports absurd page counts.
const MAX_CRAWL_PAGES: u32 = 1_000;

type Names = Arc<DashMap<String, String>>;

/// Outcome of the one crawl performed for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_fetched: u32,
    pub entries: usize,
    /// `false` when the crawl stopped on a failed page.
    pub complete: bool,
}

#[derive(Default)]
struct KindCache {
    /// Set exactly once, when the crawl task is spawned. Holds `None` until
    /// the task publishes its summary.
    crawl: OnceLock<watch::Receiver<Option<CrawlSummary>>>,
    names: Names,
}

pub struct EntityResolver {
    upstream: Arc<dyn UpstreamClient>,
    page_timeout: Duration,
    metrics: Arc<ProxyMetrics>,
    people: KindCache,
    movies: KindCache,
}

impl EntityResolver {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        config: &ResolverConfig,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        Self {
            upstream,
            page_timeout: config.page_timeout(),
            metrics,
            people: KindCache::default(),
            movies: KindCache::default(),
        }
    }

    fn cache(&self, kind: Kind) -> &KindCache {
        match kind {
            Kind::People => &self.people,
            Kind::Movies => &self.movies,
        }
    }

    /// Resolve relation references of `kind` to `(id, display name)` pairs.
    ///
    /// References whose id cannot be extracted, or whose id is unknown to the
    /// cache, are dropped. Output order follows input order.
    pub async fn resolve<S: AsRef<str>>(&self, kind: Kind, refs: &[S]) -> Vec<ResolvedRef> {
        self.warm(kind).await;
        let names = &self.cache(kind).names;

        refs.iter()
            .filter_map(|reference| {
                let id = extract_id(kind, reference.as_ref())?;
                let name = names.get(id)?;
                Some(ResolvedRef {
                    id: id.to_string(),
                    display_name: name.value().clone(),
                })
            })
            .collect()
    }

    /// Populate the cache for `kind` if no crawl has started yet, then wait
    /// for that crawl to finish.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn warm(&self, kind: Kind) -> CrawlSummary {
        let cache = self.cache(kind);
        let mut done = cache
            .crawl
            .get_or_init(|| self.spawn_crawl(kind, Arc::clone(&cache.names)))
            .clone();

        let published = done.wait_for(Option::is_some).await.map(|s| *s).ok().flatten();
        // No summary means the task died before publishing one. The attempt is
        // still spent.
        published.or_else(|| *done.borrow()).unwrap_or(CrawlSummary {
            pages_fetched: 0,
            entries: cache.names.len(),
            complete: false,
        })
    }

    /// Whether the crawl for `kind` has finished.
    pub fn is_populated(&self, kind: Kind) -> bool {
        self.cache(kind)
            .crawl
            .get()
            .is_some_and(|done| done.borrow().is_some())
    }

    pub fn cached_len(&self, kind: Kind) -> usize {
        self.cache(kind).names.len()
    }

    /// Look up one uid without triggering a crawl.
    pub fn cached_name(&self, kind: Kind, uid: &str) -> Option<String> {
        self.cache(kind).names.get(uid).map(|name| name.value().clone())
    }

    fn spawn_crawl(&self, kind: Kind, names: Names) -> watch::Receiver<Option<CrawlSummary>> {
        let (tx, rx) = watch::channel(None);
        let crawl = Crawl {
            kind,
            upstream: Arc::clone(&self.upstream),
            page_timeout: self.page_timeout,
            metrics: Arc::clone(&self.metrics),
            names,
        };
        tokio::spawn(async move {
            let summary = crawl.run().await;
            tx.send_replace(Some(summary));
        });
        rx
    }
}

/// Everything one crawl task owns.
struct Crawl {
    kind: Kind,
    upstream: Arc<dyn UpstreamClient>,
    page_timeout: Duration,
    metrics: Arc<ProxyMetrics>,
    names: Names,
}

impl Crawl {
    async fn run(self) -> CrawlSummary {
        let kind = self.kind;
        info!(kind = %kind, "Crawling upstream listing to populate resolution cache");

        let mut page = 1u32;
        let mut pages_fetched = 0u32;
        let complete = loop {
            let listing =
                match tokio::time::timeout(self.page_timeout, self.upstream.list_page(kind, page))
                    .await
                {
                    Ok(Ok(listing)) => listing,
                    Ok(Err(e)) => {
                        warn!(kind = %kind, page, error = %e, "Crawl page failed, keeping partial cache");
                        self.metrics.record_crawl_page(kind, false);
                        break false;
                    }
                    Err(_) => {
                        warn!(
                            kind = %kind,
                            page,
                            timeout_ms = self.page_timeout.as_millis() as u64,
                            "Crawl page timed out, keeping partial cache"
                        );
                        self.metrics.record_crawl_page(kind, false);
                        break false;
                    }
                };

            pages_fetched += 1;
            self.metrics.record_crawl_page(kind, true);

            for entry in listing.entries {
                // Upstream ids are immutable: the first name seen for an id wins.
                self.names.entry(entry.uid).or_insert(entry.name);
            }

            if page >= listing.total_pages {
                break true;
            }
            if page >= MAX_CRAWL_PAGES {
                warn!(kind = %kind, reported = listing.total_pages, "Crawl page limit reached");
                break false;
            }
            page += 1;
        };

        let summary = CrawlSummary {
            pages_fetched,
            entries: self.names.len(),
            complete,
        };
        info!(
            kind = %kind,
            pages = summary.pages_fetched,
            entries = summary.entries,
            complete = summary.complete,
            "Resolution cache populated"
        );
        summary
    }
}
