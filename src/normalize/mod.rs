//! # Normalizer Registry
//!
//! Maps a source's declared normalizer key to a plugin turning parsed
//! payloads into the common item shape. Validation is permissive: a
//! failing `validate` is logged and normalization proceeds anyway. An
//! unregistered key degrades to the generic fallback instead of failing
//! the source outright.

pub mod classify;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::catalog::EndpointDescriptor;
use crate::fetch::{FetchRequest, Fetcher};
use crate::parse;
use crate::types::{NormalizedItem, Priority, RawItem, RawPayload};

/// Secondary per-id fetches are bounded to one page.
const ID_FANOUT_PAGE_SIZE: usize = 10;

/// Outcome of a plugin's pre-normalization check.
#[derive(Debug, Clone)]
pub struct Validation {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

/// A source-shape-specific transformation into the common item shape.
pub trait NormalizerPlugin: Send + Sync {
    fn normalize(&self, raw: &RawPayload) -> Vec<NormalizedItem>;

    /// Pre-normalization check. Failures are logged, never blocking.
    fn validate(&self, _raw: &RawPayload) -> Validation {
        Validation::ok()
    }

    /// Optional post-step filling in fields normalization left sparse.
    fn enrich(&self, items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        items
    }

    /// Optional post-step assigning tier/priority.
    fn classify(&self, items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        items
    }
}

pub struct NormalizerRegistry {
    plugins: HashMap<String, Arc<dyn NormalizerPlugin>>,
    fallback: Arc<dyn NormalizerPlugin>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            fallback: Arc::new(GenericNormalizer),
        }
    }

    /// Registry with the stock plugins in place.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register("feed", Arc::new(FeedNormalizer));
        reg.register("generic", Arc::new(GenericNormalizer));
        reg
    }

    pub fn register(&mut self, key: &str, plugin: Arc<dyn NormalizerPlugin>) {
        self.plugins.insert(key.to_string(), plugin);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn NormalizerPlugin>> {
        self.plugins.get(key).cloned()
    }

    /// Full plugin pipeline: validate (log-only) → normalize → enrich →
    /// classify, degrading to the generic fallback for unknown keys.
    pub fn run(&self, key: &str, raw: &RawPayload) -> Vec<NormalizedItem> {
        let plugin = match self.get(key) {
            Some(p) => p,
            None => {
                tracing::debug!(key = %key, endpoint = %raw.endpoint_id, "no normalizer registered, using generic fallback");
                self.fallback.clone()
            }
        };

        let validation = plugin.validate(raw);
        if !validation.ok {
            counter!("normalize_validation_failures_total").increment(1);
            let err = crate::error::IngestError::Validation {
                errors: validation.errors,
            };
            tracing::warn!(
                endpoint = %raw.endpoint_id,
                error = %err,
                "payload validation failed, normalizing best-effort"
            );
        }

        let items = plugin.normalize(raw);
        let items = plugin.enrich(items);
        let items = plugin.classify(items);
        counter!("normalize_items_total").increment(items.len() as u64);
        items
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Standard plugin for feed-shaped sources (RSS/Atom/JSON article lists).
pub struct FeedNormalizer;

impl NormalizerPlugin for FeedNormalizer {
    fn normalize(&self, raw: &RawPayload) -> Vec<NormalizedItem> {
        let mut out = Vec::with_capacity(raw.items.len());
        for it in &raw.items {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let summary = normalize_text(it.summary.as_deref().unwrap_or_default());
            let id_seed = it
                .link
                .clone()
                .or_else(|| it.id.clone())
                .unwrap_or_else(|| title.clone());

            out.push(NormalizedItem {
                id: stable_id(&raw.endpoint_id, &id_seed),
                title,
                link: it.link.clone(),
                published_at: coerce_timestamp(it.published.as_deref()),
                summary,
                source_id: raw.endpoint_id.clone(),
                tags: Vec::new(),
                priority: Priority::Low,
                tier: crate::types::ContentTier::News,
            });
        }
        out
    }

    fn validate(&self, raw: &RawPayload) -> Validation {
        let mut errors = Vec::new();
        if raw.items.is_empty() {
            errors.push("payload contains no items".to_string());
        }
        for (i, it) in raw.items.iter().enumerate() {
            if it.title.is_none() && it.link.is_none() && it.id.is_none() {
                errors.push(format!("item {i} has neither title, link nor id"));
            }
        }
        if errors.is_empty() {
            Validation::ok()
        } else {
            Validation::failed(errors)
        }
    }

    fn enrich(&self, mut items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        for it in &mut items {
            if it.summary.is_empty() {
                it.summary = it.title.clone();
            }
        }
        items
    }

    fn classify(&self, mut items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        for it in &mut items {
            let (tier, priority) = classify::classify_text(&format!("{} {}", it.title, it.summary));
            it.tier = tier;
            it.priority = priority;
        }
        items
    }
}

/// Fallback for sources with no registered plugin: wrap whatever is there
/// into minimal items so ingestion degrades instead of failing.
pub struct GenericNormalizer;

impl NormalizerPlugin for GenericNormalizer {
    fn normalize(&self, raw: &RawPayload) -> Vec<NormalizedItem> {
        let now = Utc::now();
        let mut out = Vec::new();
        for it in &raw.items {
            let title = normalize_text(
                it.title
                    .as_deref()
                    .or(it.summary.as_deref())
                    .or(it.id.as_deref())
                    .unwrap_or_default(),
            );
            if title.is_empty() {
                continue;
            }
            let id_seed = it.link.clone().unwrap_or_else(|| title.clone());
            out.push(NormalizedItem {
                id: stable_id(&raw.endpoint_id, &id_seed),
                title,
                link: it.link.clone(),
                published_at: coerce_timestamp(it.published.as_deref()),
                summary: normalize_text(it.summary.as_deref().unwrap_or_default()),
                source_id: raw.endpoint_id.clone(),
                tags: Vec::new(),
                priority: Priority::Low,
                tier: crate::types::ContentTier::News,
            });
        }

        if out.is_empty() {
            // Nothing recognizable: one minimal placeholder item.
            out.push(NormalizedItem {
                id: stable_id(&raw.endpoint_id, "raw-payload"),
                title: format!("Unrecognized payload from {}", raw.endpoint_id),
                link: None,
                published_at: now,
                summary: String::new(),
                source_id: raw.endpoint_id.clone(),
                tags: Vec::new(),
                priority: Priority::Low,
                tier: crate::types::ContentTier::News,
            });
        }
        out
    }
}

/// Fan out a bounded secondary fetch for id-list sources, one request per
/// id through the regular fetcher so caching, health accounting, and the
/// rate limiter all still apply.
pub async fn expand_id_list(
    fetcher: &Fetcher,
    endpoint: &EndpointDescriptor,
    ids: &[String],
    timeout: std::time::Duration,
) -> Vec<RawItem> {
    let mut out = Vec::new();
    for id in ids.iter().take(ID_FANOUT_PAGE_SIZE) {
        let mut params = HashMap::new();
        params.insert("id".to_string(), id.clone());
        let url = match endpoint.resolve("item", &params) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint.id, error = %e, "id fan-out has no usable item template");
                return out;
            }
        };

        let req = FetchRequest::new(url, timeout);
        match fetcher.fetch(endpoint, &req).await {
            Ok(outcome) => match parse::parse(outcome.body(), None, &req.url) {
                Ok(mut items) => {
                    if let Some(mut item) = items.drain(..).next() {
                        item.id.get_or_insert_with(|| id.clone());
                        out.push(item);
                    }
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint.id, id = %id, error = %e, "id fan-out parse failed");
                }
            },
            Err(e) => {
                tracing::debug!(endpoint = %endpoint.id, id = %id, error = %e, "id fan-out fetch failed");
            }
        }
    }
    out
}

/// Stable item id: endpoint-scoped digest of the item's canonical link
/// (or title when no link exists). Identical across re-fetches.
pub fn stable_id(source_id: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(seed.as_bytes());
    let hash = hasher.finalize();
    hash.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Coerce a raw timestamp string into a valid instant. RFC 3339, RFC 2822,
/// bare dates, and unix-second strings are accepted; anything else (or a
/// missing value) becomes the ingestion time.
pub fn coerce_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Utc::now();
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        if let Some(out) = Utc.timestamp_opt(dt.unix_timestamp(), 0).single() {
            return out;
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Utc.from_utc_datetime(&dt);
        }
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(out) = Utc.timestamp_opt(secs, 0).single() {
            return out;
        }
    }

    Utc::now()
}

/// Normalize text: entity decode, strip tags, fold typographic quotes,
/// collapse whitespace, trim stray punctuation, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadFormat;

    fn payload(items: Vec<RawItem>) -> RawPayload {
        RawPayload {
            endpoint_id: "wire".to_string(),
            format: PayloadFormat::Xml,
            items,
        }
    }

    fn item(title: &str, link: Option<&str>) -> RawItem {
        RawItem {
            title: Some(title.to_string()),
            link: link.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_punct() {
        let s = "  Hello,&nbsp;&nbsp; world!!!  ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn normalize_text_strips_tags() {
        assert_eq!(normalize_text("<b>Bold</b> move"), "Bold move");
    }

    #[test]
    fn normalization_is_idempotent_on_ids() {
        let reg = NormalizerRegistry::with_defaults();
        let p = payload(vec![item("Story", Some("https://w.example/a"))]);
        let first = reg.run("feed", &p);
        let second = reg.run("feed", &p);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn id_is_stable_across_title_noise() {
        // Same link, different presentation: same identity.
        let a = stable_id("wire", "https://w.example/a");
        let b = stable_id("wire", "https://w.example/a");
        assert_eq!(a, b);
        assert_ne!(a, stable_id("other", "https://w.example/a"));
    }

    #[test]
    fn missing_timestamp_coerces_to_now() {
        let before = Utc::now();
        let ts = coerce_timestamp(None);
        assert!(ts >= before);
        let garbage = coerce_timestamp(Some("next Tuesday-ish"));
        assert!(garbage >= before);
    }

    #[test]
    fn known_timestamp_formats_parse() {
        let rfc3339 = coerce_timestamp(Some("2024-06-04T09:00:00Z"));
        assert_eq!(rfc3339.timestamp(), 1_717_491_600);
        let rfc2822 = coerce_timestamp(Some("Tue, 04 Jun 2024 09:00:00 GMT"));
        assert_eq!(rfc2822, rfc3339);
        let unix = coerce_timestamp(Some("1717491600"));
        assert_eq!(unix, rfc3339);
    }

    #[test]
    fn unknown_key_falls_back_to_generic() {
        let reg = NormalizerRegistry::with_defaults();
        let items = reg.run("no-such-plugin", &payload(vec![item("Hello", None)]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hello");
    }

    #[test]
    fn generic_fallback_wraps_unrecognizable_payloads() {
        let reg = NormalizerRegistry::with_defaults();
        let items = reg.run("generic", &payload(vec![]));
        assert_eq!(items.len(), 1);
        assert!(items[0].title.contains("wire"));
    }

    #[test]
    fn empty_titles_are_skipped_by_feed_plugin() {
        let reg = NormalizerRegistry::with_defaults();
        let p = payload(vec![item("", None), item("Kept", None)]);
        let items = reg.run("feed", &p);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Kept");
    }

    #[test]
    fn classify_step_assigns_tiers() {
        let reg = NormalizerRegistry::with_defaults();
        let p = payload(vec![item("Ransomware hits registry", None)]);
        let items = reg.run("feed", &p);
        assert_eq!(items[0].tier, crate::types::ContentTier::Alert);
    }

    #[test]
    fn validation_failure_does_not_block_normalization() {
        let reg = NormalizerRegistry::with_defaults();
        // Empty payload fails FeedNormalizer::validate but still runs.
        let items = reg.run("feed", &payload(vec![]));
        assert!(items.is_empty());
    }
}
