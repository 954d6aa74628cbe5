// src/fetch/transport.rs
//! The wire. A [`Transport`] performs exactly one HTTP attempt and
//! classifies its failure; retries, fallbacks, and caching live a layer
//! up in the fetcher. Tests inject scripted transports.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use url::Url;

use crate::error::IngestError;
use crate::security;
use crate::security::SecurityPolicy;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// One attempt against `url`. Implementations enforce the byte
    /// ceiling from `policy` at the header and again while streaming.
    async fn execute(
        &self,
        url: &Url,
        timeout: Duration,
        policy: &SecurityPolicy,
    ) -> Result<TransportResponse, IngestError>;
}

/// Production transport over reqwest with streamed size enforcement.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        url: &Url,
        timeout: Duration,
        policy: &SecurityPolicy,
    ) -> Result<TransportResponse, IngestError> {
        let t0 = Instant::now();

        let send = self.client.get(url.clone()).timeout(timeout).send();
        let resp = match send.await {
            Ok(r) => r,
            Err(e) => {
                return Err(classify_reqwest_error(&e));
            }
        };

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Header-side size gate.
        security::check_declared_size(resp.content_length(), policy)?;

        if !(200..300).contains(&status) {
            // Opaque denials mean the strategy itself is wrong, not a
            // transient fault: surface them distinctly so the fetcher
            // moves to the next strategy without burning retries.
            if matches!(status, 401 | 403 | 451) {
                return Err(IngestError::CorsBlocked);
            }
            return Err(IngestError::HttpStatus { code: status });
        }

        // Stream the body so an oversized response is aborted mid-flight
        // instead of buffered and then rejected.
        let mut resp = resp;
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let chunk = match resp.chunk().await {
                Ok(Some(c)) => c,
                Ok(None) => break,
                Err(e) => return Err(classify_reqwest_error(&e)),
            };
            if buf.len() + chunk.len() > policy.max_content_bytes {
                return Err(IngestError::SizeLimitExceeded {
                    limit: policy.max_content_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&buf).into_owned();
        Ok(TransportResponse {
            status,
            body,
            content_type,
            elapsed_ms: t0.elapsed().as_millis() as u64,
        })
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> IngestError {
    if e.is_timeout() {
        IngestError::Aborted
    } else {
        IngestError::Network(e.to_string())
    }
}
