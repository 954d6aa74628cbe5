// src/parse/html.rs
//! Last-ditch HTML extraction for sources that only publish a page.
//! Looks for `<article>` blocks first, then substantial anchors.

use scraper::{Html, Selector};

use crate::error::{IngestError, PayloadFormat};
use crate::types::RawItem;

/// Anchors with less text than this are navigation, not headlines.
const MIN_HEADLINE_CHARS: usize = 24;
const MAX_ITEMS: usize = 50;

pub fn parse(body: &str) -> Result<Vec<RawItem>, IngestError> {
    let doc = Html::parse_document(body);

    let article_sel = selector("article")?;
    let heading_sel = selector("h1, h2, h3")?;
    let anchor_sel = selector("a[href]")?;

    let mut items = Vec::new();

    for article in doc.select(&article_sel) {
        let title = article
            .select(&heading_sel)
            .next()
            .map(|h| collapse(&h.text().collect::<String>()));
        let link = article
            .select(&anchor_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            items.push(RawItem {
                title: Some(title),
                link,
                ..Default::default()
            });
        }
        if items.len() >= MAX_ITEMS {
            break;
        }
    }

    if items.is_empty() {
        // No article markup: fall back to headline-sized anchors.
        for a in doc.select(&anchor_sel) {
            let text = collapse(&a.text().collect::<String>());
            if text.chars().count() >= MIN_HEADLINE_CHARS {
                items.push(RawItem {
                    title: Some(text),
                    link: a.value().attr("href").map(str::to_string),
                    ..Default::default()
                });
            }
            if items.len() >= MAX_ITEMS {
                break;
            }
        }
    }

    if items.is_empty() {
        return Err(IngestError::Parse {
            format: PayloadFormat::Html,
            reason: "no article markers or headline anchors".to_string(),
        });
    }
    Ok(items)
}

fn selector(css: &str) -> Result<Selector, IngestError> {
    Selector::parse(css).map_err(|_| IngestError::Parse {
        format: PayloadFormat::Html,
        reason: format!("invalid selector: {css}"),
    })
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
