// src/parse/rss.rs
//! RSS 2.0 and Atom parsing via quick-xml serde structs. HTML entities
//! that are legal in feeds but not in strict XML are scrubbed first.

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{IngestError, PayloadFormat};
use crate::types::RawItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    title: Option<String>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

pub fn parse(body: &str) -> Result<Vec<RawItem>, IngestError> {
    let clean = scrub_html_entities_for_xml(body);
    let head: String = clean
        .trim_start()
        .chars()
        .take(200)
        .collect::<String>()
        .to_ascii_lowercase();

    if head.contains("<feed") {
        return parse_atom(&clean);
    }
    match parse_rss(&clean) {
        Ok(items) => Ok(items),
        // Not RSS-shaped; some feeds omit the <?xml?> prologue entirely.
        Err(first) => parse_atom(&clean).map_err(|_| first),
    }
}

fn parse_rss(body: &str) -> Result<Vec<RawItem>, IngestError> {
    let rss: Rss = from_str(body).map_err(|e| IngestError::Parse {
        format: PayloadFormat::Xml,
        reason: reason_from(e.to_string()),
    })?;

    Ok(rss
        .channel
        .item
        .into_iter()
        .map(|it| RawItem {
            id: None,
            title: it.title,
            link: it.link,
            published: it.pub_date,
            summary: it.description,
        })
        .collect())
}

fn parse_atom(body: &str) -> Result<Vec<RawItem>, IngestError> {
    let feed: Feed = from_str(body).map_err(|e| IngestError::Parse {
        format: PayloadFormat::Xml,
        reason: reason_from(e.to_string()),
    })?;

    Ok(feed
        .entry
        .into_iter()
        .map(|en| RawItem {
            id: en.id,
            title: en.title,
            link: en.link.into_iter().find_map(|l| l.href),
            published: en.published.or(en.updated),
            summary: en.summary,
        })
        .collect())
}

fn reason_from(msg: String) -> String {
    if msg.contains("mismatch") {
        format!("mismatched tag: {msg}")
    } else if msg.contains("missing field") {
        format!("missing channel: {msg}")
    } else {
        msg
    }
}

/// Feeds routinely carry HTML entities that strict XML rejects.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Wire</title>
  <item>
    <title>First story</title>
    <link>https://wire.example/a</link>
    <pubDate>Tue, 04 Jun 2024 09:00:00 GMT</pubDate>
    <description>Summary A</description>
  </item>
  <item><title>Second&nbsp;story</title></item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Advisories</title>
  <entry>
    <id>urn:adv:1</id>
    <title>Advisory one</title>
    <link href="https://adv.example/1"/>
    <updated>2024-06-04T09:00:00Z</updated>
    <summary>Details</summary>
  </entry>
</feed>"#;

    #[test]
    fn rss_items_map_to_raw_items() {
        let items = parse(RSS).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("First story"));
        assert_eq!(items[0].link.as_deref(), Some("https://wire.example/a"));
        assert_eq!(
            items[0].published.as_deref(),
            Some("Tue, 04 Jun 2024 09:00:00 GMT")
        );
        assert_eq!(items[1].title.as_deref(), Some("Second story"));
    }

    #[test]
    fn atom_entries_map_to_raw_items() {
        let items = parse(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_deref(), Some("urn:adv:1"));
        assert_eq!(items[0].link.as_deref(), Some("https://adv.example/1"));
        assert_eq!(items[0].published.as_deref(), Some("2024-06-04T09:00:00Z"));
    }

    #[test]
    fn malformed_xml_is_a_named_parse_error() {
        let err = parse("<rss><channel><item><title>open").unwrap_err();
        match err {
            IngestError::Parse { format, reason } => {
                assert_eq!(format, PayloadFormat::Xml);
                assert!(!reason.is_empty());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_channel_is_well_formed_and_empty() {
        let items = parse(r#"<rss version="2.0"><channel></channel></rss>"#).unwrap();
        assert!(items.is_empty());
    }
}
