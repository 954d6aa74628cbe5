// src/config.rs
//! Environment-sourced ingestion policy. `.env` is honored in local runs
//! via `dotenvy`; every knob falls back to a conservative default so the
//! pipeline boots with zero configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

const ENV_ALLOWED_HOSTS: &str = "INGEST_ALLOWED_HOSTS";
const ENV_ALLOWED_HOSTS_PATH: &str = "INGEST_ALLOWED_HOSTS_PATH";
const ENV_MAX_CONTENT_BYTES: &str = "INGEST_MAX_CONTENT_BYTES";
const ENV_BLOCK_PRIVATE: &str = "INGEST_BLOCK_PRIVATE_HOSTS";
const ENV_MAX_CONCURRENT: &str = "INGEST_MAX_CONCURRENT";
const ENV_CACHE_MAX_AGE: &str = "INGEST_CACHE_MAX_AGE_SECS";
const ENV_RETRY_ATTEMPTS: &str = "INGEST_RETRY_ATTEMPTS";
const ENV_TIMEOUT_SECS: &str = "INGEST_TIMEOUT_SECS";
const ENV_PROXY_URLS: &str = "INGEST_PROXY_URLS";
const ENV_REFRESH_INTERVALS: &str = "INGEST_REFRESH_INTERVALS";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Hosts a fetch may target. Empty means "no allow-list configured".
    pub allowed_hosts: Vec<String>,
    pub max_content_bytes: usize,
    pub block_private_hosts: bool,
    /// Seconds between refreshes, keyed by source category.
    pub refresh_intervals: HashMap<String, u64>,
    pub max_concurrent: usize,
    pub default_cache_max_age: Duration,
    pub retry_attempts: u32,
    pub request_timeout: Duration,
    /// Proxy rewrite templates for the fallback chain, `{url}` placeholder.
    pub proxy_urls: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            max_content_bytes: 2 * 1024 * 1024,
            block_private_hosts: true,
            refresh_intervals: HashMap::new(),
            max_concurrent: 6,
            default_cache_max_age: Duration::from_secs(300),
            retry_attempts: 2,
            request_timeout: Duration::from_secs(10),
            proxy_urls: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Read the policy from the environment. Missing or unparseable
    /// variables fall back to the defaults; the allow-list additionally
    /// falls back to the config-file chain.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let base = Self::default();

        let allowed_hosts = match std::env::var(ENV_ALLOWED_HOSTS) {
            Ok(s) => split_csv(&s),
            Err(_) => load_allowed_hosts_default().unwrap_or_default(),
        };

        Self {
            allowed_hosts,
            max_content_bytes: env_parse(ENV_MAX_CONTENT_BYTES, base.max_content_bytes),
            block_private_hosts: env_flag(ENV_BLOCK_PRIVATE, base.block_private_hosts),
            refresh_intervals: std::env::var(ENV_REFRESH_INTERVALS)
                .ok()
                .map(|s| parse_intervals(&s))
                .unwrap_or_default(),
            max_concurrent: env_parse(ENV_MAX_CONCURRENT, base.max_concurrent).max(1),
            default_cache_max_age: Duration::from_secs(env_parse(
                ENV_CACHE_MAX_AGE,
                base.default_cache_max_age.as_secs(),
            )),
            retry_attempts: env_parse(ENV_RETRY_ATTEMPTS, base.retry_attempts),
            request_timeout: Duration::from_secs(env_parse(
                ENV_TIMEOUT_SECS,
                base.request_timeout.as_secs(),
            )),
            proxy_urls: std::env::var(ENV_PROXY_URLS)
                .map(|s| split_csv(&s))
                .unwrap_or_default(),
        }
    }

    /// Refresh interval for a category, defaulting to 300s.
    pub fn refresh_interval(&self, category: &str) -> Duration {
        Duration::from_secs(*self.refresh_intervals.get(category).unwrap_or(&300))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn split_csv(s: &str) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for part in s.split(',') {
        let t = part.trim();
        if !t.is_empty() {
            set.insert(t.to_ascii_lowercase());
        }
    }
    set.into_iter().collect()
}

/// `"news=300,alert=60"` → map of category to seconds.
fn parse_intervals(s: &str) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for part in s.split(',') {
        if let Some((k, v)) = part.split_once('=') {
            if let Ok(secs) = v.trim().parse::<u64>() {
                out.insert(k.trim().to_string(), secs);
            }
        }
    }
    out
}

/// Load the host allow-list from an explicit path. TOML (`hosts = [...]`)
/// or a JSON string array.
pub fn load_allowed_hosts_from(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading allow-list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_allowed_hosts(&content, ext.as_str())
}

/// Allow-list lookup chain:
/// 1) $INGEST_ALLOWED_HOSTS_PATH
/// 2) config/allowed_hosts.toml
/// 3) config/allowed_hosts.json
pub fn load_allowed_hosts_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_ALLOWED_HOSTS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_allowed_hosts_from(&pb);
        }
        return Err(anyhow!(
            "INGEST_ALLOWED_HOSTS_PATH points to non-existent path"
        ));
    }
    let toml_p = PathBuf::from("config/allowed_hosts.toml");
    if toml_p.exists() {
        return load_allowed_hosts_from(&toml_p);
    }
    let json_p = PathBuf::from("config/allowed_hosts.json");
    if json_p.exists() {
        return load_allowed_hosts_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_allowed_hosts(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("hosts");
    if try_toml {
        if let Ok(v) = parse_toml_hosts(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json_hosts(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml_hosts(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported allow-list format"))
}

fn parse_toml_hosts(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlHosts {
        hosts: Vec<String>,
    }
    let v: TomlHosts = toml::from_str(s)?;
    Ok(split_csv(&v.hosts.join(",")))
}

fn parse_json_hosts(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(split_csv(&v.join(",")))
}
