// tests/ingest_pipeline.rs
// Orchestrator end-to-end: mixed-format sources, per-source diagnostics,
// merge order, and the id-list fan-out path — all over a mock transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use intel_feed_aggregator::catalog::{EndpointDescriptor, StaticCatalog};
use intel_feed_aggregator::error::IngestError;
use intel_feed_aggregator::fetch::transport::{Transport, TransportResponse};
use intel_feed_aggregator::security::SecurityPolicy;
use intel_feed_aggregator::types::SourceStatus;
use intel_feed_aggregator::{IngestConfig, Orchestrator};

/// Serves canned bodies keyed by `host + path`; unknown URLs fail.
struct MapTransport {
    bodies: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MapTransport {
    fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            bodies: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MapTransport {
    async fn execute(
        &self,
        url: &Url,
        _timeout: Duration,
        _policy: &SecurityPolicy,
    ) -> Result<TransportResponse, IngestError> {
        let key = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
        self.calls.lock().unwrap().push(key.clone());
        match self.bodies.get(&key) {
            Some(body) => Ok(TransportResponse {
                status: 200,
                body: body.clone(),
                content_type: None,
                elapsed_ms: 3,
            }),
            None => Err(IngestError::Network(format!("no route to {key}"))),
        }
    }
}

fn endpoint(id: &str, base_url: &str, extra: &str) -> EndpointDescriptor {
    serde_json::from_str(&format!(
        r#"{{
            "id": "{id}",
            "name": "{id}",
            "base_url": "{base_url}",
            "cors_capable": true,
            "quota": {{ "count": 100, "period_secs": 60 }}
            {extra}
        }}"#
    ))
    .unwrap()
}

fn test_config() -> IngestConfig {
    IngestConfig {
        retry_attempts: 1,
        request_timeout: Duration::from_secs(2),
        max_concurrent: 4,
        ..IngestConfig::default()
    }
}

const RSS_BODY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item>
    <title>Ransomware wave reported</title>
    <link>https://wire.example/a</link>
    <pubDate>Tue, 04 Jun 2024 09:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;

const JSON_BODY: &str = r#"{"articles":[
  {"title":"Market update","url":"https://api.example/m","published":"2024-06-05T10:00:00Z"}
]}"#;

#[tokio::test]
async fn mixed_sources_merge_with_per_source_diagnostics() {
    let transport = MapTransport::new(&[
        ("wire.example/rss.xml", RSS_BODY),
        ("api.example/v1/articles", JSON_BODY),
    ]);
    let catalog = StaticCatalog::new(vec![
        endpoint("wire", "https://wire.example/rss.xml", ""),
        endpoint("api", "https://api.example/v1/articles", ""),
        endpoint("dead", "https://dead.example/feed", ""),
    ]);

    let orch = Orchestrator::new(test_config(), Arc::new(catalog), transport, None);
    let report = orch.ingest("all").await;

    // One source failing must not prevent the others from completing.
    assert_eq!(report.diagnostics.len(), 3);
    let by_id: HashMap<_, _> = report
        .diagnostics
        .iter()
        .map(|d| (d.endpoint_id.as_str(), d))
        .collect();
    assert_eq!(by_id["wire"].status, SourceStatus::Success);
    assert_eq!(by_id["api"].status, SourceStatus::Success);
    assert_eq!(by_id["dead"].status, SourceStatus::Failed);
    assert!(by_id["dead"].reason.contains("exhausted"));

    // Newest first across sources.
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].title, "Market update");
    assert_eq!(report.items[1].title, "Ransomware wave reported");
    assert_eq!(report.items[1].source_id, "wire");
}

#[tokio::test]
async fn empty_payload_is_reported_as_empty_not_failed() {
    let transport = MapTransport::new(&[(
        "quiet.example/rss.xml",
        r#"<rss version="2.0"><channel></channel></rss>"#,
    )]);
    let catalog = StaticCatalog::new(vec![endpoint("quiet", "https://quiet.example/rss.xml", "")]);

    let orch = Orchestrator::new(test_config(), Arc::new(catalog), transport, None);
    let report = orch.ingest("all").await;

    assert_eq!(report.diagnostics[0].status, SourceStatus::Empty);
    assert!(report.items.is_empty());
}

#[tokio::test]
async fn id_list_sources_fan_out_through_the_fetcher() {
    let transport = MapTransport::new(&[
        ("list.example/v0/topstories.json", "[1, 2]"),
        (
            "list.example/v0/item/1.json",
            r#"{"id":1,"title":"First story","url":"https://l.example/1","time":1717491600}"#,
        ),
        (
            "list.example/v0/item/2.json",
            r#"{"id":2,"title":"Second story","url":"https://l.example/2","time":1717491700}"#,
        ),
    ]);
    let catalog = StaticCatalog::new(vec![endpoint(
        "list",
        "https://list.example/v0/",
        r#", "paths": { "latest": "topstories.json", "item": "item/{id}.json" }"#,
    )]);

    let transport_probe = transport.clone();
    let orch = Orchestrator::new(test_config(), Arc::new(catalog), transport, None);
    let report = orch.ingest("all").await;

    assert_eq!(report.diagnostics[0].status, SourceStatus::Success);
    assert_eq!(report.items.len(), 2);
    // Newest first: item 2 carries the later timestamp.
    assert_eq!(report.items[0].title, "Second story");
    // List fetch plus one fetch per id.
    assert_eq!(transport_probe.call_count(), 3);
}

#[tokio::test]
async fn duplicate_items_across_refetches_are_deduplicated() {
    let transport = MapTransport::new(&[("wire.example/rss.xml", RSS_BODY)]);
    let catalog = StaticCatalog::new(vec![endpoint("wire", "https://wire.example/rss.xml", "")]);

    let orch = Orchestrator::new(test_config(), Arc::new(catalog), transport, None);
    let first = orch.ingest("all").await;
    let second = orch.ingest("all").await;

    // Same underlying item, same stable id — whether live or cached.
    assert_eq!(first.items[0].id, second.items[0].id);
    assert_eq!(second.diagnostics[0].reason, "cache hit");
}

#[tokio::test]
async fn category_mode_filters_the_catalog() {
    let transport = MapTransport::new(&[("wire.example/rss.xml", RSS_BODY)]);
    let catalog = StaticCatalog::new(vec![
        endpoint(
            "wire",
            "https://wire.example/rss.xml",
            r#", "category": "news""#,
        ),
        endpoint(
            "dead",
            "https://dead.example/feed",
            r#", "category": "intel""#,
        ),
    ]);

    let orch = Orchestrator::new(test_config(), Arc::new(catalog), transport, None);
    let report = orch.ingest("news").await;

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].endpoint_id, "wire");
}
