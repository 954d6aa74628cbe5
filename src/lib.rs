// src/lib.rs
// Public library surface for the ingestion core.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod health;
pub mod normalize;
pub mod orchestrator;
pub mod parse;
pub mod ratelimit;
pub mod security;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::cache::{FileStore, MemoryStore, PersistentStore, ResponseCache};
pub use crate::catalog::{EndpointDescriptor, RateQuota, SourceCatalog, StaticCatalog};
pub use crate::config::IngestConfig;
pub use crate::error::{IngestError, PayloadFormat};
pub use crate::fetch::{FetchOutcome, FetchRequest, Fetcher};
pub use crate::health::HealthTracker;
pub use crate::normalize::{NormalizerPlugin, NormalizerRegistry};
pub use crate::orchestrator::Orchestrator;
pub use crate::ratelimit::RateLimiter;
pub use crate::types::{IngestReport, NormalizedItem, SourceDiagnostic, SourceStatus};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - a debug build (or INGEST_ENV in {local, development, dev})
///   - INGEST_DEV_LOG=1
pub fn enable_dev_tracing() {
    let dev_flag = std::env::var("INGEST_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("INGEST_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}
