// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadFormat;

/// Content tier of a normalized item, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTier {
    Alert,
    Threat,
    Intel,
    News,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Common item shape every source is normalized into.
///
/// `id` is stable across re-fetches of the same underlying item so
/// downstream de-duplication works; `published_at` is always a valid
/// instant (unparseable or missing timestamps coerce to ingestion time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub source_id: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub tier: ContentTier,
}

/// Canonical fields a parser extracts before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub summary: Option<String>,
}

impl RawItem {
    /// An identifier-only entry, as produced by id-list sources.
    pub fn is_id_only(&self) -> bool {
        self.id.is_some() && self.title.is_none() && self.link.is_none()
    }
}

/// Parsed payload handed to the normalizer registry.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub endpoint_id: String,
    pub format: PayloadFormat,
    pub items: Vec<RawItem>,
}

impl RawPayload {
    /// Ids of identifier-only entries; non-empty means the source is a
    /// list source that needs a secondary per-id fetch.
    pub fn id_list(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|it| it.is_id_only())
            .filter_map(|it| it.id.clone())
            .collect()
    }
}

/// Per-source outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Empty,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDiagnostic {
    pub endpoint_id: String,
    pub status: SourceStatus,
    pub reason: String,
    pub item_count: usize,
    pub elapsed_ms: u64,
}

/// Merged output of one ingestion pass: the items that made it through,
/// plus one diagnostic per attempted source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub items: Vec<NormalizedItem>,
    pub diagnostics: Vec<SourceDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_only_detection() {
        let it = RawItem {
            id: Some("42".into()),
            ..Default::default()
        };
        assert!(it.is_id_only());

        let it2 = RawItem {
            id: Some("42".into()),
            title: Some("story".into()),
            ..Default::default()
        };
        assert!(!it2.is_id_only());
    }

    #[test]
    fn id_list_collects_only_bare_ids() {
        let payload = RawPayload {
            endpoint_id: "hn".into(),
            format: PayloadFormat::Json,
            items: vec![
                RawItem {
                    id: Some("1".into()),
                    ..Default::default()
                },
                RawItem {
                    id: Some("2".into()),
                    title: Some("already full".into()),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(payload.id_list(), vec!["1".to_string()]);
    }
}
