// src/normalize/classify.rs
//! Keyword-driven tier/priority assignment for normalized items. Small
//! built-in lexicon; matching is case-insensitive on title + summary.

use crate::types::{ContentTier, Priority};

const ALERT_TERMS: &[&str] = &[
    "zero-day",
    "0day",
    "actively exploited",
    "ransomware",
    "breach",
    "emergency directive",
    "critical vulnerability",
];

const THREAT_TERMS: &[&str] = &[
    "malware",
    "phishing",
    "botnet",
    "exploit",
    "apt",
    "backdoor",
    "trojan",
    "cve-",
    "vulnerability",
];

const INTEL_TERMS: &[&str] = &[
    "advisory",
    "analysis",
    "campaign",
    "report",
    "disclosure",
    "threat actor",
    "indicators of compromise",
];

const URGENT_TERMS: &[&str] = &["critical", "urgent", "immediately", "in the wild"];

/// Assign a content tier and priority from the item text.
pub fn classify_text(text: &str) -> (ContentTier, Priority) {
    let t = text.to_ascii_lowercase();

    let tier = if contains_any(&t, ALERT_TERMS) {
        ContentTier::Alert
    } else if contains_any(&t, THREAT_TERMS) {
        ContentTier::Threat
    } else if contains_any(&t, INTEL_TERMS) {
        ContentTier::Intel
    } else {
        ContentTier::News
    };

    let priority = match tier {
        ContentTier::Alert => Priority::High,
        ContentTier::Threat => {
            if contains_any(&t, URGENT_TERMS) {
                Priority::High
            } else {
                Priority::Medium
            }
        }
        ContentTier::Intel => Priority::Medium,
        ContentTier::News => {
            if contains_any(&t, URGENT_TERMS) {
                Priority::Medium
            } else {
                Priority::Low
            }
        }
    };

    (tier, priority)
}

fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| haystack.contains(t))
}
