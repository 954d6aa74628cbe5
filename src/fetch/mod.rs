//! # Retrying Fetcher with Fallback Chain
//!
//! One request walks a chain of transport strategies. Each chain entry
//! gets the same bounded retry policy with an increasing delay between
//! attempts; a blocked/opaque response skips straight to the next
//! strategy because the strategy itself is wrong, and an abort stops the
//! whole chain. Only after every strategy is exhausted is the cache
//! consulted for a stale entry, and only then does the failure surface.
//!
//! The fetcher owns the full per-request sequence (gate, cache lookup,
//! rate-limit check, attempts, health accounting, cache write) so that
//! secondary fetches issued by normalizers ride the same rails.

pub mod strategy;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use url::Url;

use crate::cache::ResponseCache;
use crate::catalog::EndpointDescriptor;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::health::HealthTracker;
use crate::ratelimit::RateLimiter;
use crate::security::{self, SecurityPolicy};
use strategy::FetchStrategy;
use transport::Transport;

/// Cache policy and timeout for one ingestion attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub timeout: Duration,
    pub use_cache: bool,
    pub max_age_override: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            use_cache: true,
            max_age_override: None,
        }
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Live response from one of the strategies.
    Fetched {
        status: u16,
        body: String,
        content_type: Option<String>,
        elapsed_ms: u64,
    },
    /// Served from the cache without a network call.
    Cached { body: String },
    /// Expired entry served because every live strategy failed.
    Stale { body: String },
}

impl FetchOutcome {
    pub fn body(&self) -> &str {
        match self {
            FetchOutcome::Fetched { body, .. }
            | FetchOutcome::Cached { body }
            | FetchOutcome::Stale { body } => body,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            FetchOutcome::Fetched { content_type, .. } => content_type.as_deref(),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FetchOutcome::Stale { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per chain entry.
    pub attempts: u32,
    /// Delay before attempt n is `base_delay * n`.
    pub base_delay: Duration,
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: SecurityPolicy,
    retry: RetryPolicy,
    proxy_templates: Vec<String>,
    cache: Arc<ResponseCache>,
    health: Arc<HealthTracker>,
    limiter: Arc<RateLimiter>,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: SecurityPolicy,
        retry: RetryPolicy,
        proxy_templates: Vec<String>,
        cache: Arc<ResponseCache>,
        health: Arc<HealthTracker>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            transport,
            policy,
            retry,
            proxy_templates,
            cache,
            health,
            limiter,
        }
    }

    /// Wire a fetcher from the ingestion policy, sharing the given
    /// service handles.
    pub fn from_config(
        cfg: &IngestConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<ResponseCache>,
        health: Arc<HealthTracker>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::new(
            transport,
            SecurityPolicy::from_config(cfg),
            RetryPolicy {
                attempts: cfg.retry_attempts.max(1),
                base_delay: Duration::from_millis(500),
            },
            cfg.proxy_urls.clone(),
            cache,
            health,
            limiter,
        )
    }

    /// Run the full per-request sequence for one endpoint URL.
    pub async fn fetch(
        &self,
        endpoint: &EndpointDescriptor,
        req: &FetchRequest,
    ) -> Result<FetchOutcome, IngestError> {
        // Gate first; a disallowed URL never costs a network call.
        let url = security::validate(&req.url, &self.policy)?;
        let key = cache_key(&endpoint.id, &url);

        if req.use_cache {
            if let Some(body) = self.cache.get(&key, req.max_age_override) {
                counter!("fetch_cache_hits_total").increment(1);
                return Ok(FetchOutcome::Cached { body });
            }
        }

        if !self.limiter.check(&endpoint.id, &endpoint.quota) {
            counter!("fetch_rate_limited_total").increment(1);
            return Err(IngestError::RateLimitExceeded {
                endpoint: endpoint.id.clone(),
            });
        }

        let chain = strategy::chain_for(endpoint.cors_capable, &self.proxy_templates);
        match self.walk_chain(endpoint, &url, &chain, req.timeout).await {
            Ok(outcome) => {
                if let FetchOutcome::Fetched { body, .. } = &outcome {
                    self.cache.set(&key, body, Some(endpoint.cache_max_age()));
                }
                Ok(outcome)
            }
            Err(IngestError::AllStrategiesExhausted) => {
                // Last resort: an expired entry beats no entry at all.
                if let Some(body) = self.cache.get_stale(&key) {
                    tracing::warn!(endpoint = %endpoint.id, "serving stale cache entry after chain exhaustion");
                    counter!("fetch_stale_hits_total").increment(1);
                    return Ok(FetchOutcome::Stale { body });
                }
                Err(IngestError::AllStrategiesExhausted)
            }
            Err(other) => Err(other),
        }
    }

    async fn walk_chain(
        &self,
        endpoint: &EndpointDescriptor,
        url: &Url,
        chain: &[FetchStrategy],
        timeout: Duration,
    ) -> Result<FetchOutcome, IngestError> {
        for strat in chain {
            let target = match strat.rewrite(url) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(strategy = %strat.label(), error = %e, "strategy rewrite failed");
                    continue;
                }
            };

            for attempt in 1..=self.retry.attempts {
                if attempt > 1 {
                    tokio::time::sleep(self.retry.base_delay * (attempt - 1)).await;
                }

                let t0 = Instant::now();
                counter!("fetch_attempts_total").increment(1);

                // The per-request timeout aborts the in-flight call; the
                // transport's own timeout is a second line of defense.
                let attempt_result = match tokio::time::timeout(
                    timeout,
                    self.transport.execute(&target, timeout, &self.policy),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(IngestError::Aborted),
                };

                match attempt_result {
                    Ok(resp) => {
                        self.health.record_success(&endpoint.id, resp.elapsed_ms);
                        tracing::debug!(
                            endpoint = %endpoint.id,
                            strategy = %strat.label(),
                            status = resp.status,
                            elapsed_ms = resp.elapsed_ms,
                            "fetch succeeded"
                        );
                        return Ok(FetchOutcome::Fetched {
                            status: resp.status,
                            body: resp.body,
                            content_type: resp.content_type,
                            elapsed_ms: resp.elapsed_ms,
                        });
                    }
                    Err(err) => {
                        let elapsed_ms = t0.elapsed().as_millis() as u64;
                        self.health
                            .record_failure(&endpoint.id, elapsed_ms, &err.to_string());
                        counter!("fetch_failures_total").increment(1);
                        tracing::debug!(
                            endpoint = %endpoint.id,
                            strategy = %strat.label(),
                            attempt,
                            error = %err,
                            "fetch attempt failed"
                        );

                        match err {
                            // Cancellation kills the whole chain.
                            IngestError::Aborted => return Err(IngestError::Aborted),
                            // Gate verdicts are terminal, never retried.
                            IngestError::SizeLimitExceeded { .. }
                            | IngestError::DisallowedHost { .. } => return Err(err),
                            // A blocked response means this strategy is
                            // wrong, not flaky: next chain entry.
                            IngestError::CorsBlocked => break,
                            // Transient: next attempt on this strategy.
                            _ => {}
                        }
                    }
                }
            }
        }
        Err(IngestError::AllStrategiesExhausted)
    }
}

fn cache_key(endpoint_id: &str, url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}:{}?{}", endpoint_id, url.path(), q),
        None => format!("{}:{}", endpoint_id, url.path()),
    }
}
