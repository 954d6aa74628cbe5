// src/parse/text.rs
//! Bounded plain-text parsing: one item per non-empty line, capped.

use crate::error::{IngestError, PayloadFormat};
use crate::types::RawItem;

const MAX_LINES: usize = 100;
const MAX_LINE_CHARS: usize = 500;

pub fn parse(body: &str) -> Result<Vec<RawItem>, IngestError> {
    if body.contains('\0') {
        return Err(IngestError::Parse {
            format: PayloadFormat::Text,
            reason: "binary content".to_string(),
        });
    }

    let items: Vec<RawItem> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_LINES)
        .map(|line| RawItem {
            title: Some(truncate(line, MAX_LINE_CHARS)),
            ..Default::default()
        })
        .collect();

    if items.is_empty() {
        return Err(IngestError::Parse {
            format: PayloadFormat::Text,
            reason: "empty body".to_string(),
        });
    }
    Ok(items)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_become_items() {
        let items = parse("first headline\n\n  second headline  \n").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title.as_deref(), Some("second headline"));
    }

    #[test]
    fn line_count_is_bounded() {
        let body = (0..500).map(|i| format!("line {i}\n")).collect::<String>();
        let items = parse(&body).unwrap();
        assert_eq!(items.len(), MAX_LINES);
    }

    #[test]
    fn blank_body_fails() {
        let err = parse("   \n  \n").unwrap_err();
        match err {
            IngestError::Parse { reason, .. } => assert_eq!(reason, "empty body"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn nul_bytes_fail_the_wellformedness_check() {
        let err = parse("head\0line").unwrap_err();
        match err {
            IngestError::Parse { reason, .. } => assert_eq!(reason, "binary content"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
