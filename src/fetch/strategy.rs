// src/fetch/strategy.rs
//! Transport strategies: a direct call, or a proxy rewrite of the target
//! URL. The fetcher walks an ordered chain of these after a failure.

use url::Url;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStrategy {
    Direct,
    /// Proxy rewrite template with a `{url}` placeholder for the
    /// percent-encoded target, e.g. `https://relay.example/get?url={url}`.
    Proxy(String),
}

impl FetchStrategy {
    /// Rewrite the target URL for this strategy.
    pub fn rewrite(&self, target: &Url) -> Result<Url, IngestError> {
        match self {
            FetchStrategy::Direct => Ok(target.clone()),
            FetchStrategy::Proxy(template) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
                let rewritten = template.replace("{url}", &encoded);
                Url::parse(&rewritten).map_err(|_| IngestError::Network(format!(
                    "invalid proxy template: {template}"
                )))
            }
        }
    }

    /// Short label for logs and diagnostics.
    pub fn label(&self) -> String {
        match self {
            FetchStrategy::Direct => "direct".to_string(),
            FetchStrategy::Proxy(template) => {
                let host = Url::parse(&template.replace("{url}", "x"))
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "proxy".to_string());
                format!("proxy:{host}")
            }
        }
    }
}

/// Build the chain for one endpoint: sources that speak to us directly
/// are tried direct-first; the configured proxies follow as fallbacks.
/// Sources known to refuse direct calls start with the proxies instead.
pub fn chain_for(cors_capable: bool, proxy_templates: &[String]) -> Vec<FetchStrategy> {
    let proxies = proxy_templates
        .iter()
        .map(|t| FetchStrategy::Proxy(t.clone()));

    if cors_capable {
        std::iter::once(FetchStrategy::Direct).chain(proxies).collect()
    } else {
        proxies.chain(std::iter::once(FetchStrategy::Direct)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_passes_url_through() {
        let target = Url::parse("https://feeds.example.com/rss.xml").unwrap();
        assert_eq!(FetchStrategy::Direct.rewrite(&target).unwrap(), target);
    }

    #[test]
    fn proxy_encodes_target_into_template() {
        let target = Url::parse("https://feeds.example.com/rss.xml?page=1").unwrap();
        let s = FetchStrategy::Proxy("https://relay.example/get?url={url}".to_string());
        let out = s.rewrite(&target).unwrap();
        assert_eq!(out.host_str(), Some("relay.example"));
        assert!(out.as_str().contains("https%3A%2F%2Ffeeds.example.com"));
    }

    #[test]
    fn labels_identify_the_strategy() {
        assert_eq!(FetchStrategy::Direct.label(), "direct");
        let s = FetchStrategy::Proxy("https://relay.example/get?url={url}".to_string());
        assert_eq!(s.label(), "proxy:relay.example");
    }

    #[test]
    fn chain_order_follows_cors_capability() {
        let proxies = vec!["https://relay.example/{url}".to_string()];
        let direct_first = chain_for(true, &proxies);
        assert_eq!(direct_first[0], FetchStrategy::Direct);
        let proxy_first = chain_for(false, &proxies);
        assert!(matches!(proxy_first[0], FetchStrategy::Proxy(_)));
        assert_eq!(*proxy_first.last().unwrap(), FetchStrategy::Direct);
    }
}
