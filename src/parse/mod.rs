//! # Format Sniffer & Parser Dispatch
//!
//! The declared content-type header is not trusted: intermediary proxies
//! routinely mislabel payloads or wrap the real body inside a JSON
//! envelope. Dispatch therefore inspects the body's leading structure,
//! unwraps known envelopes, and only then hands off to the per-format
//! parser. If nothing matches, XML is attempted as a last resort before
//! the payload is treated as bounded plain text.

pub mod html;
pub mod json;
pub mod rss;
pub mod text;

use sha2::{Digest, Sha256};

use crate::error::{IngestError, PayloadFormat};
use crate::types::RawItem;

/// Parse a raw body into canonical items, picking the true format from
/// the body itself. `declared_content_type` is only used for a mismatch
/// log line; `source_url` only for diagnostics.
pub fn parse(
    raw_body: &str,
    declared_content_type: Option<&str>,
    source_url: &str,
) -> Result<Vec<RawItem>, IngestError> {
    let body = strip_leading_noise(raw_body);

    // Proxy envelope: {"contents": "<real body>", ...} — unwrap and re-sniff.
    if let Some(inner) = unwrap_envelope(body) {
        tracing::debug!(url = %source_url, "unwrapped proxy envelope, re-sniffing inner body");
        return parse(&inner, declared_content_type, source_url);
    }

    let sniffed = sniff(body);
    if let (Some(declared), Some(actual)) = (declared_content_type, sniffed) {
        if !declared_matches(declared, actual) {
            tracing::debug!(
                url = %source_url,
                declared = %declared,
                actual = %actual,
                "content-type header disagrees with sniffed format"
            );
        }
    }

    let result = match sniffed {
        Some(PayloadFormat::Xml) => rss::parse(body),
        Some(PayloadFormat::Json) => json::parse(body),
        Some(PayloadFormat::Html) => html::parse(body),
        Some(PayloadFormat::Text) | None => {
            // No structural signal: try XML once before settling on text.
            match rss::parse(body) {
                Ok(items) => Ok(items),
                Err(_) => text::parse(body),
            }
        }
    };

    if let Err(err) = &result {
        // Log a fingerprint, never the payload itself.
        tracing::warn!(
            url = %source_url,
            digest = %payload_digest(raw_body),
            error = %err,
            "parse failed"
        );
    }
    result
}

/// Pick the format from the body's leading structure. `None` means no
/// structural signal at all.
pub fn sniff(body: &str) -> Option<PayloadFormat> {
    let head = body.trim_start();
    let lower: String = head.chars().take(64).collect::<String>().to_ascii_lowercase();

    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some(PayloadFormat::Html);
    }
    if lower.starts_with("<?xml")
        || lower.starts_with("<rss")
        || lower.starts_with("<feed")
        || lower.starts_with("<rdf")
    {
        return Some(PayloadFormat::Xml);
    }
    if head.starts_with('{') || head.starts_with('[') {
        return Some(PayloadFormat::Json);
    }
    if head.starts_with('<') {
        // Some tag, but neither a feed root nor an html marker.
        return Some(PayloadFormat::Xml);
    }
    if !head.is_empty() {
        return Some(PayloadFormat::Text);
    }
    None
}

/// A JSON object carrying the real body as a string `contents` field.
fn unwrap_envelope(body: &str) -> Option<String> {
    if !body.trim_start().starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("contents")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn declared_matches(declared: &str, actual: PayloadFormat) -> bool {
    let d = declared.to_ascii_lowercase();
    match actual {
        PayloadFormat::Xml => d.contains("xml"),
        PayloadFormat::Json => d.contains("json"),
        PayloadFormat::Html => d.contains("html"),
        PayloadFormat::Text => d.contains("text/plain"),
    }
}

/// Redacted digest for logs: fixed-width sha256 prefix plus byte length.
pub fn payload_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let hash = hasher.finalize();
    let hex: String = hash.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("{}:{}b", hex, raw.len())
}

/// UTF-8 BOM and leading whitespace confuse prefix sniffing; drop them.
fn strip_leading_noise(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}').trim_start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_wins_over_declared_json() {
        let body = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title><item><title>A</title></item></channel></rss>"#;
        let items = parse(body, Some("application/json"), "https://s.example/feed").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn envelope_is_unwrapped_and_resniffed() {
        let wrapped = serde_json::json!({
            "contents": "<rss version=\"2.0\"><channel><item><title>Inner</title></item></channel></rss>",
            "status": { "http_code": 200 }
        })
        .to_string();
        let items = parse(&wrapped, Some("application/json"), "https://p.example").unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Inner"));
    }

    #[test]
    fn sniff_recognizes_the_usual_shapes() {
        assert_eq!(sniff("  {\"a\":1}"), Some(PayloadFormat::Json));
        assert_eq!(sniff("[1,2]"), Some(PayloadFormat::Json));
        assert_eq!(sniff("<?xml version=\"1.0\"?><rss/>"), Some(PayloadFormat::Xml));
        assert_eq!(sniff("<!DOCTYPE html><html></html>"), Some(PayloadFormat::Html));
        assert_eq!(sniff("plain headline"), Some(PayloadFormat::Text));
        assert_eq!(sniff("   "), None);
    }

    #[test]
    fn bom_does_not_break_sniffing() {
        assert_eq!(sniff("\u{feff}{\"a\":1}"), Some(PayloadFormat::Json));
        let body = "\u{feff}<rss version=\"2.0\"><channel><item><title>B</title></item></channel></rss>";
        let items = parse(body, None, "https://s.example").unwrap();
        assert_eq!(items[0].title.as_deref(), Some("B"));
    }

    #[test]
    fn digest_is_fixed_width_and_content_free() {
        let d = payload_digest("secret payload body");
        assert_eq!(d.split(':').next().unwrap().len(), 12);
        assert!(d.ends_with("19b"));
        assert!(!d.contains("secret"));
    }

    #[test]
    fn empty_body_is_a_parse_error() {
        let err = parse("", None, "https://s.example").unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));
    }
}
