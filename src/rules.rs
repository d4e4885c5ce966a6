//! # Rule Ordering and Filtering
//!
//! Rules are opaque ordered match clauses; the engine evaluates them top
//! to bottom, so composition is order-sensitive. Two invariants hold
//! everywhere in the pipeline:
//!
//! 1. The terminal catch-all rules (`MATCH,` prefix) already present in a
//!    list stay last, always. A rule placed after `MATCH` would be dead.
//! 2. Newly introduced rules take priority over existing non-terminal
//!    rules: they are inserted ahead of them.
//!
//! Dedup is by exact string equality, first occurrence wins, applied
//! after the insertion order is computed.

use log::info;
use serde_yaml::Value;

use crate::document;

/// Prefix that marks a terminal catch-all rule.
const TERMINAL_PREFIX: &str = "MATCH,";

/// Category token removed by the GEOIP filter, compared case-insensitively.
const GEOIP_PREFIX: &str = "GEOIP,";

/// Merge new rules into an existing rule list.
///
/// New rules land ahead of the existing non-terminal rules; the existing
/// terminal rules keep their place at the end. Non-string and blank
/// entries are dropped, then the whole list is deduplicated by exact
/// value with first occurrence winning.
pub fn insert_rules(existing: &[Value], new_rules: &[Value]) -> Vec<String> {
    let existing_clean = document::string_items(existing);
    let new_clean = document::string_items(new_rules);

    let (terminal, non_terminal): (Vec<String>, Vec<String>) = existing_clean
        .into_iter()
        .partition(|rule| rule.starts_with(TERMINAL_PREFIX));

    let mut merged = new_clean;
    merged.extend(non_terminal);
    merged.extend(terminal);
    document::unique_items(merged)
}

/// Remove every GEOIP-category rule, logging the removed count.
///
/// The only stage allowed to shrink the rule list outside deduplication.
pub fn strip_geoip_rules(rules: Vec<Value>) -> Vec<Value> {
    let mut removed = 0usize;
    let filtered: Vec<Value> = rules
        .into_iter()
        .filter(|rule| {
            let is_geoip = rule
                .as_str()
                .map(|s| s.trim().to_ascii_uppercase().starts_with(GEOIP_PREFIX))
                .unwrap_or(false);
            if is_geoip {
                removed += 1;
            }
            !is_geoip
        })
        .collect();

    if removed > 0 {
        info!("GEOIP filtering enabled, removed {} rule(s)", removed);
    }
    filtered
}
