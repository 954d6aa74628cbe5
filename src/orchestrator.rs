//! # Orchestrator
//!
//! Fans ingestion out across every endpoint the catalog supplies, bounded
//! by the configured concurrency width, then merges whatever succeeded.
//! Sources complete in arbitrary order; one source failing never aborts
//! the pass — it becomes a diagnostic entry instead. The shared services
//! (cache, rate limiter, health tracker, registry) are constructed here
//! once and handed to the fetch path by handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::{PersistentStore, ResponseCache};
use crate::catalog::{EndpointDescriptor, SourceCatalog};
use crate::config::IngestConfig;
use crate::error::PayloadFormat;
use crate::fetch::transport::Transport;
use crate::fetch::{FetchOutcome, FetchRequest, Fetcher};
use crate::health::HealthTracker;
use crate::normalize::{self, NormalizerRegistry};
use crate::parse;
use crate::ratelimit::RateLimiter;
use crate::types::{
    IngestReport, NormalizedItem, RawPayload, SourceDiagnostic, SourceStatus,
};

/// One-time metrics registration (so series show up on the exporter side).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_attempts_total", "Fetch attempts across all strategies.");
        describe_counter!("fetch_failures_total", "Failed fetch attempts.");
        describe_counter!("fetch_cache_hits_total", "Requests served from cache.");
        describe_counter!(
            "fetch_stale_hits_total",
            "Requests served stale after chain exhaustion."
        );
        describe_counter!("fetch_rate_limited_total", "Requests denied by the rate limiter.");
        describe_counter!("normalize_items_total", "Items produced by normalizer plugins.");
        describe_counter!(
            "normalize_validation_failures_total",
            "Payloads that failed plugin validation."
        );
        describe_counter!("ingest_runs_total", "Completed ingestion passes.");
        describe_counter!("ingest_items_total", "Items merged into pass output.");
        describe_counter!("ingest_sources_failed_total", "Sources that failed a pass.");
        describe_histogram!("ingest_source_elapsed_ms", "Per-source pipeline time.");
        describe_gauge!("ingest_last_run_ts", "Unix ts of the last completed pass.");
    });
}

pub struct Orchestrator {
    config: IngestConfig,
    catalog: Arc<dyn SourceCatalog>,
    fetcher: Arc<Fetcher>,
    registry: Arc<NormalizerRegistry>,
    health: Arc<HealthTracker>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
}

impl Orchestrator {
    /// Construct the shared services once and wire the fetch path.
    pub fn new(
        config: IngestConfig,
        catalog: Arc<dyn SourceCatalog>,
        transport: Arc<dyn Transport>,
        store: Option<Arc<dyn PersistentStore>>,
    ) -> Self {
        ensure_metrics_described();

        let cache = Arc::new(ResponseCache::new(config.default_cache_max_age, store));
        let health = Arc::new(HealthTracker::new());
        let limiter = Arc::new(RateLimiter::new());
        let fetcher = Arc::new(Fetcher::from_config(
            &config,
            transport,
            cache.clone(),
            health.clone(),
            limiter.clone(),
        ));

        Self {
            config,
            catalog,
            fetcher,
            registry: Arc::new(NormalizerRegistry::with_defaults()),
            health,
            limiter,
            cache,
        }
    }

    /// Swap in a registry with extra plugins registered.
    pub fn with_registry(mut self, registry: NormalizerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run one ingestion pass over the catalog's endpoints for `mode`.
    pub async fn ingest(&self, mode: &str) -> IngestReport {
        let endpoints = self.catalog.endpoints(mode);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut set: JoinSet<(String, SourceDiagnostic, Vec<NormalizedItem>)> = JoinSet::new();

        for endpoint in endpoints.iter().cloned() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let registry = self.registry.clone();
            let timeout = self.config.request_timeout;

            set.spawn(async move {
                // Fan-out width is the only backpressure mechanism.
                let _permit = semaphore.acquire_owned().await;
                let id = endpoint.id.clone();
                let (diag, items) = ingest_one(&fetcher, &registry, &endpoint, timeout).await;
                (id, diag, items)
            });
        }

        // Completion order is arbitrary; collect and re-key by endpoint.
        let mut by_endpoint: HashMap<String, (SourceDiagnostic, Vec<NormalizedItem>)> =
            HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, diag, items)) => {
                    by_endpoint.insert(id, (diag, items));
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "ingestion task panicked or was cancelled");
                }
            }
        }

        let mut items = Vec::new();
        let mut diagnostics = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            if let Some((diag, mut source_items)) = by_endpoint.remove(&endpoint.id) {
                if diag.status == SourceStatus::Failed {
                    counter!("ingest_sources_failed_total").increment(1);
                }
                diagnostics.push(diag);
                items.append(&mut source_items);
            }
        }

        // Stable-id dedup across sources, newest first.
        let mut seen = std::collections::HashSet::new();
        items.retain(|it| seen.insert(it.id.clone()));
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        counter!("ingest_runs_total").increment(1);
        counter!("ingest_items_total").increment(items.len() as u64);
        gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            mode = %mode,
            sources = diagnostics.len(),
            items = items.len(),
            "ingestion pass complete"
        );

        IngestReport { items, diagnostics }
    }
}

/// The per-source pipeline: fetch → sniff/parse → (id fan-out) →
/// normalize. Every failure becomes a diagnostic, never a panic.
async fn ingest_one(
    fetcher: &Fetcher,
    registry: &NormalizerRegistry,
    endpoint: &EndpointDescriptor,
    timeout: std::time::Duration,
) -> (SourceDiagnostic, Vec<NormalizedItem>) {
    let t0 = Instant::now();
    let req = FetchRequest::new(endpoint.default_url(), timeout);

    let outcome = match fetcher.fetch(endpoint, &req).await {
        Ok(o) => o,
        Err(e) => {
            return (
                diagnostic(endpoint, SourceStatus::Failed, &e.to_string(), 0, t0),
                Vec::new(),
            )
        }
    };

    let parsed = match parse::parse(outcome.body(), outcome.content_type(), &req.url) {
        Ok(items) => items,
        Err(e) => {
            return (
                diagnostic(endpoint, SourceStatus::Failed, &e.to_string(), 0, t0),
                Vec::new(),
            )
        }
    };

    let format = parse::sniff(outcome.body()).unwrap_or(PayloadFormat::Text);
    let mut payload = RawPayload {
        endpoint_id: endpoint.id.clone(),
        format,
        items: parsed,
    };

    // Id-list sources carry no content yet: fan out per-id fetches first.
    let ids = payload.id_list();
    if !ids.is_empty() && ids.len() == payload.items.len() {
        payload.items = normalize::expand_id_list(fetcher, endpoint, &ids, timeout).await;
    }

    let items = registry.run(&endpoint.normalizer, &payload);

    let (status, reason) = if items.is_empty() {
        (SourceStatus::Empty, "no items after normalization".to_string())
    } else if outcome.is_stale() {
        (SourceStatus::Success, "stale cache fallback".to_string())
    } else if matches!(outcome, FetchOutcome::Cached { .. }) {
        (SourceStatus::Success, "cache hit".to_string())
    } else {
        (SourceStatus::Success, "ok".to_string())
    };

    (
        diagnostic(endpoint, status, &reason, items.len(), t0),
        items,
    )
}

fn diagnostic(
    endpoint: &EndpointDescriptor,
    status: SourceStatus,
    reason: &str,
    item_count: usize,
    t0: Instant,
) -> SourceDiagnostic {
    let elapsed_ms = t0.elapsed().as_millis() as u64;
    histogram!("ingest_source_elapsed_ms").record(elapsed_ms as f64);
    SourceDiagnostic {
        endpoint_id: endpoint.id.clone(),
        status,
        reason: reason.to_string(),
        item_count,
        elapsed_ms,
    }
}
