//! # Source Catalog
//! Endpoint descriptors and the catalog interface the orchestrator pulls
//! them from. Descriptors are static configuration: the core only reads
//! them, never mutates them.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Declared request quota: `count` requests per `period_secs` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateQuota {
    pub count: u32,
    pub period_secs: u64,
}

impl RateQuota {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

fn default_quota() -> RateQuota {
    RateQuota {
        count: 30,
        period_secs: 60,
    }
}

fn default_cache_max_age_secs() -> u64 {
    300
}

fn default_normalizer() -> String {
    "feed".to_string()
}

/// Immutable description of one remote source.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDescriptor {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Named path templates with `{placeholder}` segments,
    /// e.g. `"item" -> "item/{id}.json"`.
    #[serde(default)]
    pub paths: HashMap<String, String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub cors_capable: bool,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default = "default_quota")]
    pub quota: RateQuota,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
    /// Key into the normalizer registry.
    #[serde(default = "default_normalizer")]
    pub normalizer: String,
}

impl EndpointDescriptor {
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Resolve a named path template against `base_url`, substituting
    /// `{placeholder}` segments from `params`.
    pub fn resolve(&self, path_name: &str, params: &HashMap<String, String>) -> Result<String> {
        let template = self
            .paths
            .get(path_name)
            .ok_or_else(|| anyhow!("endpoint {} has no path template '{}'", self.id, path_name))?;

        let mut path = template.clone();
        for (k, v) in params {
            path = path.replace(&format!("{{{k}}}"), v);
        }
        if path.contains('{') {
            return Err(anyhow!(
                "unresolved placeholder in path '{}' for endpoint {}",
                path,
                self.id
            ));
        }

        let base = self.base_url.trim_end_matches('/');
        Ok(format!("{}/{}", base, path.trim_start_matches('/')))
    }

    /// URL for the default listing fetch: the `latest` template when the
    /// descriptor declares one, the bare base URL otherwise.
    pub fn default_url(&self) -> String {
        static EMPTY: once_cell::sync::Lazy<HashMap<String, String>> =
            once_cell::sync::Lazy::new(HashMap::new);
        self.resolve("latest", &EMPTY)
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

/// Supplies endpoint descriptors for one ingestion pass. Implementations
/// must hand out descriptors that stay immutable for the pass duration.
pub trait SourceCatalog: Send + Sync {
    fn endpoints(&self, mode: &str) -> Vec<EndpointDescriptor>;
}

/// Fixed in-memory catalog; the usual production shape is one deserialized
/// from configuration at startup.
pub struct StaticCatalog {
    entries: Vec<EndpointDescriptor>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<EndpointDescriptor>) -> Self {
        Self { entries }
    }

    /// Load from a JSON array of descriptors.
    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<EndpointDescriptor> = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }
}

impl SourceCatalog for StaticCatalog {
    fn endpoints(&self, mode: &str) -> Vec<EndpointDescriptor> {
        if mode.is_empty() || mode == "all" {
            return self.entries.clone();
        }
        self.entries
            .iter()
            .filter(|e| e.category == mode)
            .cloned()
            .collect()
    }
}
