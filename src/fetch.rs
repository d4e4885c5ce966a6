//! # Subscription Fetching
//!
//! Retrieves each enabled subscription's remote document, parses it as a
//! Clash-style YAML payload, and applies the subscription's name prefix
//! and include/exclude filters. Every fetched-and-filtered node list is
//! snapshotted to durable storage keyed by subscription name, regardless
//! of whether the rest of the run succeeds, so operators can inspect
//! exactly what each source returned.
//!
//! A failing subscription never fails the run: the pipeline records the
//! failure and proceeds without that source's nodes.

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::dedup::ProxyNode;
use crate::document::{self, PROXIES_KEY};
use crate::error::{Error, Result};
use crate::subscription::Subscription;

/// What one successful subscription fetch produced.
#[derive(Debug)]
pub struct FetchedNodes {
    /// Prefixed and filtered node list, in payload order.
    pub nodes: Vec<ProxyNode>,
    /// The raw response body, for optional debugging snapshots.
    pub raw: String,
}

/// HTTP fetcher shared across all subscriptions of one run.
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    /// Build a client with the per-request timeout and this tool's UA.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("subforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::Network {
                url: String::new(),
                message: format!("failed to build http client: {}", err),
            })?;
        Ok(Self { client })
    }

    /// Fetch one subscription and return its filtered node list.
    pub fn fetch(&self, sub: &Subscription) -> Result<FetchedNodes> {
        let url = sub.url.trim();
        if url.is_empty() {
            return Err(Error::Fetch {
                subscription: sub.display_name(),
                message: "empty url".to_string(),
            });
        }
        // Fail early on unparsable URLs with a clearer message than the
        // transport layer would give.
        url::Url::parse(url)?;

        debug!("fetching subscription '{}'", sub.display_name());
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| Error::Network {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let body = response.text().map_err(|err| Error::Network {
            url: url.to_string(),
            message: format!("failed to read response body: {}", err),
        })?;

        let fetched = parse_subscription_nodes(&body)?;
        let nodes = filter_nodes(sub, fetched);
        info!("{}: fetched={}", sub.display_name(), nodes.len());

        Ok(FetchedNodes { nodes, raw: body })
    }
}

/// Parse a subscription payload into its node list.
///
/// The payload must be a YAML mapping with a `proxies` sequence;
/// anything else is a per-subscription error. Non-mapping entries inside
/// the sequence are dropped.
pub fn parse_subscription_nodes(text: &str) -> Result<Vec<ProxyNode>> {
    let parsed: Value = serde_yaml::from_str(text)?;
    let root = parsed.as_mapping().ok_or_else(|| Error::Document {
        context: "subscription payload".to_string(),
        message: "payload must be clash yaml with a 'proxies' list".to_string(),
    })?;

    match document::get(root, PROXIES_KEY) {
        Some(Value::Sequence(seq)) => Ok(seq
            .iter()
            .filter_map(Value::as_mapping)
            .cloned()
            .collect()),
        _ => Err(Error::Document {
            context: "subscription payload".to_string(),
            message: "payload must be clash yaml with a 'proxies' list".to_string(),
        }),
    }
}

/// Apply prefixing and include/exclude filtering to fetched nodes.
pub fn filter_nodes(sub: &Subscription, nodes: Vec<ProxyNode>) -> Vec<ProxyNode> {
    let mut kept = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        let raw_name = document::get(&node, "name")
            .and_then(Value::as_str)
            .unwrap_or("node")
            .to_string();
        let name = sub.prefixed_name(&raw_name);
        if !sub.keeps(&name) {
            continue;
        }
        document::set(&mut node, "name", Value::String(name));
        kept.push(node);
    }
    kept
}

/// Persist a subscription's filtered node list as `<name>.yaml`.
///
/// Snapshot shape mirrors a minimal subscription payload so it can be
/// inspected (or re-fed) with the same tooling.
pub fn write_snapshot(subs_dir: &Path, name: &str, nodes: &[ProxyNode]) -> Result<()> {
    let mut root = Mapping::new();
    document::set(
        &mut root,
        PROXIES_KEY,
        Value::Sequence(nodes.iter().cloned().map(Value::Mapping).collect()),
    );
    let text = document::to_yaml_string(&Value::Mapping(root))?;
    std::fs::write(subs_dir.join(format!("{}.yaml", name)), text)?;
    Ok(())
}

/// Persist the raw response body as `<name>.raw.txt` for debugging.
pub fn write_raw(subs_dir: &Path, name: &str, raw: &str) -> Result<()> {
    std::fs::write(subs_dir.join(format!("{}.raw.txt", name)), raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription() -> Subscription {
        Subscription {
            name: "main".to_string(),
            url: "https://example.com/sub".to_string(),
            enabled: true,
            prefix: String::new(),
            include_filter: String::new(),
            exclude_filter: String::new(),
            save_raw: false,
        }
    }

    #[test]
    fn test_parse_valid_payload() {
        let nodes = parse_subscription_nodes(
            "proxies:\n  - {name: a, type: ss, server: h, port: 1}\n  - {name: b, type: ss, server: h, port: 2}\n",
        )
        .unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_parse_drops_non_mapping_entries() {
        let nodes =
            parse_subscription_nodes("proxies:\n  - {name: a, type: ss}\n  - just-a-string\n")
                .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_parse_rejects_missing_proxies() {
        let err = parse_subscription_nodes("rules: []").unwrap_err();
        assert!(format!("{}", err).contains("'proxies' list"));
    }

    #[test]
    fn test_parse_rejects_non_mapping_payload() {
        assert!(parse_subscription_nodes("- a\n- b").is_err());
        assert!(parse_subscription_nodes("ss://opaque-uri-line").is_err());
    }

    #[test]
    fn test_filter_applies_prefix() {
        let mut sub = subscription();
        sub.prefix = "[M] ".to_string();
        let nodes = parse_subscription_nodes("proxies: [{name: a, type: ss}]").unwrap();
        let filtered = filter_nodes(&sub, nodes);
        assert_eq!(
            document::get(&filtered[0], "name"),
            Some(&Value::String("[M] a".to_string()))
        );
    }

    #[test]
    fn test_filter_include_exclude() {
        let mut sub = subscription();
        sub.include_filter = "US".to_string();
        sub.exclude_filter = "expire".to_string();
        let nodes = parse_subscription_nodes(
            "proxies: [{name: US-1, type: ss}, {name: JP-1, type: ss}, {name: US-expire, type: ss}]",
        )
        .unwrap();
        let filtered = filter_nodes(&sub, nodes);
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            document::get(&filtered[0], "name"),
            Some(&Value::String("US-1".to_string()))
        );
    }

    #[test]
    fn test_filter_matches_prefixed_name() {
        // Filters see the name after prefixing, not the raw vendor name.
        let mut sub = subscription();
        sub.prefix = "[M] ".to_string();
        sub.include_filter = r"^\[M\] ".to_string();
        let nodes = parse_subscription_nodes("proxies: [{name: a, type: ss}]").unwrap();
        assert_eq!(filter_nodes(&sub, nodes).len(), 1);
    }

    #[test]
    fn test_fetch_rejects_empty_url() {
        let fetcher = Fetcher::new(Duration::from_secs(1)).unwrap();
        let mut sub = subscription();
        sub.url = "   ".to_string();
        let err = fetcher.fetch(&sub).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[test]
    fn test_fetch_rejects_invalid_url() {
        let fetcher = Fetcher::new(Duration::from_secs(1)).unwrap();
        let mut sub = subscription();
        sub.url = "not a url".to_string();
        assert!(fetcher.fetch(&sub).is_err());
    }

    #[test]
    fn test_write_snapshot_roundtrips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let nodes = parse_subscription_nodes("proxies: [{name: a, type: ss}]").unwrap();
        write_snapshot(tmp.path(), "main", &nodes).unwrap();
        let written = std::fs::read_to_string(tmp.path().join("main.yaml")).unwrap();
        let reparsed = parse_subscription_nodes(&written).unwrap();
        assert_eq!(reparsed, nodes);
    }

    #[test]
    fn test_write_raw() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_raw(tmp.path(), "main", "raw body").unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("main.raw.txt")).unwrap(),
            "raw body"
        );
    }
}
