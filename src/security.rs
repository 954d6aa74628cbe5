//! # Ingestion Security Gate
//!
//! Validates candidate source URLs before any network call: scheme and
//! host checks up front, declared-size check once response headers arrive,
//! and a streamed-size abort enforced by the transport. The gate runs at
//! both ends so an oversized or disallowed response never reaches a parser.

use url::Url;

use crate::config::IngestConfig;
use crate::error::IngestError;

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Non-empty list restricts fetches to exactly these hosts.
    pub allowed_hosts: Vec<String>,
    pub max_content_bytes: usize,
    pub block_private_hosts: bool,
}

impl SecurityPolicy {
    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self {
            allowed_hosts: cfg.allowed_hosts.clone(),
            max_content_bytes: cfg.max_content_bytes,
            block_private_hosts: cfg.block_private_hosts,
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(host))
    }
}

/// Validate a candidate URL against the policy. Returns the parsed URL on
/// success so callers never re-parse.
pub fn validate(raw_url: &str, policy: &SecurityPolicy) -> Result<Url, IngestError> {
    let url = Url::parse(raw_url).map_err(|_| IngestError::DisallowedHost {
        host: raw_url.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(IngestError::DisallowedHost {
            host: url.scheme().to_string(),
        });
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.is_empty() {
        return Err(IngestError::DisallowedHost { host });
    }

    if !policy.host_allowed(&host) {
        tracing::debug!(host = %host, "gate: host not on allow-list");
        return Err(IngestError::DisallowedHost { host });
    }

    if policy.block_private_hosts && is_private_host(&host) {
        tracing::debug!(host = %host, "gate: private network target blocked");
        return Err(IngestError::DisallowedHost { host });
    }

    // Heuristic: date-like path segments usually mean an article page, not
    // a feed. Hosts on the allow-list are taken at their word.
    if looks_like_article(&url) && !policy.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
        tracing::debug!(url = %url, "gate: date-like path, treated as article not feed");
        return Err(IngestError::DisallowedHost { host });
    }

    Ok(url)
}

/// Boolean-shaped convenience used where only a yes/no is needed.
pub fn is_allowed(raw_url: &str, policy: &SecurityPolicy) -> bool {
    validate(raw_url, policy).is_ok()
}

/// Check a declared `Content-Length` against the byte ceiling. The
/// streaming ceiling is enforced separately by the transport.
pub fn check_declared_size(
    declared: Option<u64>,
    policy: &SecurityPolicy,
) -> Result<(), IngestError> {
    if let Some(len) = declared {
        if len > policy.max_content_bytes as u64 {
            return Err(IngestError::SizeLimitExceeded {
                limit: policy.max_content_bytes,
            });
        }
    }
    Ok(())
}

/// Loopback and RFC-1918 targets: localhost, 127.*, 10.*, 192.168.*,
/// 172.16–31.*, plus the v6 loopback.
fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host == "::1" || host == "[::1]" {
        return true;
    }
    if host.starts_with("127.") || host.starts_with("10.") || host.starts_with("192.168.") {
        return true;
    }
    if let Some(rest) = host.strip_prefix("172.") {
        if let Some(second) = rest.split('.').next() {
            if let Ok(n) = second.parse::<u8>() {
                return (16..=31).contains(&n);
            }
        }
    }
    false
}

/// Date-like path heuristic: two consecutive segments shaped `/YYYY/MM/`
/// mark the URL as an article permalink. This is a heuristic, not a
/// guarantee; the allow-list is the escape hatch for hosts it misjudges.
pub fn looks_like_article(url: &Url) -> bool {
    let segments: Vec<&str> = match url.path_segments() {
        Some(s) => s.collect(),
        None => return false,
    };
    segments.windows(2).any(|w| {
        let year = w[0].len() == 4 && w[0].chars().all(|c| c.is_ascii_digit());
        let month = (1..=2).contains(&w[1].len())
            && w[1].chars().all(|c| c.is_ascii_digit())
            && w[1].parse::<u8>().map(|m| (1..=12).contains(&m)).unwrap_or(false);
        year && month
    })
}
