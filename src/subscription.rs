//! # Subscription Records
//!
//! A subscription is an operator-configured remote source of proxy nodes.
//! The record is read-only to the pipeline; the list file is owned by an
//! external editor and re-read fresh at the start of every run.
//!
//! Name filters are user-supplied regular expressions. An invalid pattern
//! never fails a run: it is logged once per evaluation and treated as
//! "always pass", because a typo in a filter should cost filtering, not
//! the whole merge.

use std::path::Path;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One operator-configured remote source of proxy nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Display name; also keys the on-disk node snapshot.
    #[serde(default = "default_name")]
    pub name: String,
    /// Remote document URL.
    #[serde(default)]
    pub url: String,
    /// Disabled subscriptions are skipped entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prefix applied to every node name from this source.
    #[serde(default)]
    pub prefix: String,
    /// Regex a node name must match to be kept, when non-empty.
    #[serde(default)]
    pub include_filter: String,
    /// Regex a node name must not match to be kept, when non-empty.
    #[serde(default)]
    pub exclude_filter: String,
    /// Keep the raw fetched payload beside the snapshot for debugging.
    #[serde(default)]
    pub save_raw: bool,
}

fn default_name() -> String {
    "sub".to_string()
}

fn default_true() -> bool {
    true
}

impl Subscription {
    /// The trimmed display name, never empty.
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            default_name()
        } else {
            trimmed.to_string()
        }
    }

    /// Apply the configured prefix to a raw node name.
    pub fn prefixed_name(&self, raw: &str) -> String {
        let base = raw.trim();
        let base = if base.is_empty() { "node" } else { base };
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}{}", prefix, base)
        }
    }

    /// Decide whether a (already prefixed) node name passes the filters.
    ///
    /// Include filter set: the name must match. Exclude filter set: the
    /// name must not match. Invalid patterns always pass.
    pub fn keeps(&self, node_name: &str) -> bool {
        let include = self.include_filter.trim();
        if !include.is_empty() {
            match Regex::new(include) {
                Ok(re) => {
                    if !re.is_match(node_name) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(
                        "subscription '{}': invalid include_filter, keeping node: {}",
                        self.display_name(),
                        err
                    );
                }
            }
        }

        let exclude = self.exclude_filter.trim();
        if !exclude.is_empty() {
            match Regex::new(exclude) {
                Ok(re) => {
                    if re.is_match(node_name) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(
                        "subscription '{}': invalid exclude_filter, keeping node: {}",
                        self.display_name(),
                        err
                    );
                }
            }
        }

        true
    }
}

/// On-disk shape of the subscription list file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionListFile {
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

/// Load the subscription list from disk.
///
/// An absent file means no subscriptions. A malformed file is logged and
/// treated as empty; the list is operator-owned and a broken edit should
/// not abort scheduled runs.
pub fn load_subscriptions(path: &Path) -> Result<Vec<Subscription>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<SubscriptionListFile>(&text) {
        Ok(file) => Ok(file.subscriptions),
        Err(err) => {
            warn!("failed to parse {}: {}", path.display(), err);
            Ok(Vec::new())
        }
    }
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
    fn test_prefixed_name_no_prefix() {
        assert_eq!(subscription().prefixed_name("  us-1  "), "us-1");
    }

    #[test]
    fn test_prefixed_name_with_prefix() {
        let mut sub = subscription();
        sub.prefix = "[A] ".to_string();
        assert_eq!(sub.prefixed_name("us-1"), "[A] us-1");
    }

    #[test]
    fn test_prefixed_name_empty_falls_back() {
        assert_eq!(subscription().prefixed_name("   "), "node");
    }

    #[test]
    fn test_keeps_no_filters() {
        assert!(subscription().keeps("anything"));
    }

    #[test]
    fn test_keeps_include_filter() {
        let mut sub = subscription();
        sub.include_filter = "US|SG".to_string();
        assert!(sub.keeps("US-01"));
        assert!(!sub.keeps("JP-01"));
    }

    #[test]
    fn test_keeps_exclude_filter() {
        let mut sub = subscription();
        sub.exclude_filter = "expire|流量".to_string();
        assert!(!sub.keeps("剩余流量: 10GB"));
        assert!(sub.keeps("US-01"));
    }

    #[test]
    fn test_keeps_invalid_pattern_passes() {
        let mut sub = subscription();
        sub.include_filter = "[unclosed".to_string();
        sub.exclude_filter = "(broken".to_string();
        assert!(sub.keeps("US-01"));
    }

    #[test]
    fn test_display_name_defaults() {
        let mut sub = subscription();
        sub.name = "   ".to_string();
        assert_eq!(sub.display_name(), "sub");
    }

    #[test]
    fn test_load_subscriptions_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let subs = load_subscriptions(&tmp.path().join("subscriptions.json")).unwrap();
        assert!(subs.is_empty());
    }

    #[test]
    fn test_load_subscriptions_parses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("subscriptions.json");
        std::fs::write(
            &path,
            r#"{"subscriptions": [{"name": "a", "url": "https://example.com"}]}"#,
        )
        .unwrap();
        let subs = load_subscriptions(&path).unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].enabled);
        assert!(!subs[0].save_raw);
    }

    #[test]
    fn test_load_subscriptions_malformed_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("subscriptions.json");
        std::fs::write(&path, "{not json").unwrap();
        let subs = load_subscriptions(&path).unwrap();
        assert!(subs.is_empty());
    }
}
