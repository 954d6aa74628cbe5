// src/parse/json.rs
//! JSON payloads: a top-level array, a wrapper object with one of the
//! usual collection keys, or a bare id list (numbers/strings) from
//! list-returning sources.

use serde_json::Value;

use crate::error::{IngestError, PayloadFormat};
use crate::types::RawItem;

const COLLECTION_KEYS: [&str; 5] = ["items", "articles", "results", "data", "entries"];

pub fn parse(body: &str) -> Result<Vec<RawItem>, IngestError> {
    let value: Value = serde_json::from_str(body).map_err(|e| IngestError::Parse {
        format: PayloadFormat::Json,
        reason: format!("unexpected token: {e}"),
    })?;

    let list = match &value {
        Value::Array(arr) => arr.clone(),
        Value::Object(map) => {
            let mut found = None;
            for key in COLLECTION_KEYS {
                if let Some(Value::Array(arr)) = map.get(key) {
                    found = Some(arr.clone());
                    break;
                }
            }
            match found {
                Some(arr) => arr,
                // A single object is a one-item payload.
                None => vec![value.clone()],
            }
        }
        _ => {
            return Err(IngestError::Parse {
                format: PayloadFormat::Json,
                reason: "top-level value is not an object or array".to_string(),
            })
        }
    };

    Ok(list.iter().map(raw_item_from).collect())
}

fn raw_item_from(v: &Value) -> RawItem {
    match v {
        // Bare ids: list sources answer with `[101, 102, ...]`.
        Value::Number(n) => RawItem {
            id: Some(n.to_string()),
            ..Default::default()
        },
        Value::String(s) if !s.contains(char::is_whitespace) => RawItem {
            id: Some(s.clone()),
            ..Default::default()
        },
        Value::String(s) => RawItem {
            title: Some(s.clone()),
            ..Default::default()
        },
        Value::Object(map) => RawItem {
            id: first_string(map, &["id", "guid", "uuid"]),
            title: first_string(map, &["title", "name", "headline"]),
            link: first_string(map, &["link", "url", "href"]),
            published: first_string(
                map,
                &["published", "published_at", "pubDate", "date", "created_at", "time"],
            ),
            summary: first_string(map, &["summary", "description", "content", "body", "text"]),
        },
        _ => RawItem::default(),
    }
}

fn first_string(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}
