// src/error.rs
use thiserror::Error;

/// Payload formats the sniffer can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PayloadFormat {
    Xml,
    Json,
    Html,
    Text,
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PayloadFormat::Xml => "xml",
            PayloadFormat::Json => "json",
            PayloadFormat::Html => "html",
            PayloadFormat::Text => "text",
        };
        f.write_str(s)
    }
}

/// Failure taxonomy for one ingestion attempt.
///
/// Gate and rate-limit failures are terminal for the request. Transport
/// failures (`Network`, `CorsBlocked`, `HttpStatus`) drive retry/fallback
/// inside the fetcher; `Aborted` stops the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("host not permitted: {host}")]
    DisallowedHost { host: String },

    #[error("response exceeded size ceiling of {limit} bytes")]
    SizeLimitExceeded { limit: usize },

    #[error("rate limit exceeded for endpoint {endpoint}")]
    RateLimitExceeded { endpoint: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("blocked or opaque response, strategy unusable")]
    CorsBlocked,

    #[error("upstream returned HTTP {code}")]
    HttpStatus { code: u16 },

    #[error("request aborted")]
    Aborted,

    #[error("{format} parse failed: {reason}")]
    Parse {
        format: PayloadFormat,
        reason: String,
    },

    #[error("payload validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("all fetch strategies exhausted")]
    AllStrategiesExhausted,
}

impl IngestError {
    /// Whether the fetcher may try again (same strategy or the next one).
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Network(_) | IngestError::CorsBlocked | IngestError::HttpStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(IngestError::Network("reset".into()).retryable());
        assert!(IngestError::CorsBlocked.retryable());
        assert!(IngestError::HttpStatus { code: 503 }.retryable());
    }

    #[test]
    fn terminal_failures_are_not() {
        assert!(!IngestError::Aborted.retryable());
        assert!(!IngestError::SizeLimitExceeded { limit: 1024 }.retryable());
        assert!(!IngestError::DisallowedHost {
            host: "evil.example".into()
        }
        .retryable());
        assert!(!IngestError::RateLimitExceeded {
            endpoint: "e1".into()
        }
        .retryable());
    }
}
