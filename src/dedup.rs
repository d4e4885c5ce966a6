//! # Node Deduplication
//!
//! Subscriptions from different vendors frequently resell the same
//! upstream endpoints under different display names. Deduplication is
//! therefore content-based: a fingerprint over the fields that identify
//! the actual endpoint, independent of the name and of which subscription
//! the node arrived from. First occurrence (in fetch order) wins.
//!
//! After fingerprint collapse, node names are made globally unique by
//! suffixing `_<n>` to later collisions, deterministically for a fixed
//! input order.

use std::collections::{HashMap, HashSet};

use serde_yaml::{Mapping, Value};

use crate::document;

/// One outbound proxy endpoint definition, as parsed from a subscription.
pub type ProxyNode = Mapping;

/// The fixed identity field set. Two nodes equal on all of these refer to
/// the same underlying endpoint; `name` is deliberately not included.
const FINGERPRINT_KEYS: [&str; 8] = [
    "type", "server", "port", "uuid", "password", "cipher", "network", "plugin",
];

/// Render one fingerprint field. Absent fields fingerprint as the empty
/// string rather than acting as wildcards.
fn field_repr(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Build the order-stable identity key for a node.
pub fn fingerprint(node: &ProxyNode) -> String {
    FINGERPRINT_KEYS
        .iter()
        .map(|key| field_repr(document::get(node, key)))
        .collect::<Vec<_>>()
        .join("|")
}

/// The trimmed node name, with the documented `"node"` fallback.
pub fn node_name(node: &ProxyNode) -> String {
    match document::get(node, "name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "node".to_string(),
    }
}

/// Rewrite node names so every name is globally unique.
///
/// The first node with a given base name keeps it; each later collision
/// becomes `<name>_<n>`, where `n` counts up per base name and skips
/// candidates already taken by an original or previously renamed node.
pub fn ensure_unique_names(nodes: Vec<ProxyNode>) -> Vec<ProxyNode> {
    let mut used: HashMap<String, u64> = HashMap::new();
    let mut result = Vec::with_capacity(nodes.len());

    for mut node in nodes {
        let name = node_name(&node);
        if !used.contains_key(&name) {
            used.insert(name.clone(), 1);
            document::set(&mut node, "name", Value::String(name));
            result.push(node);
            continue;
        }

        let mut count = used[&name];
        loop {
            let candidate = format!("{}_{}", name, count);
            count += 1;
            if !used.contains_key(&candidate) {
                document::set(&mut node, "name", Value::String(candidate.clone()));
                used.insert(name.clone(), count);
                used.insert(candidate, 1);
                break;
            }
        }
        result.push(node);
    }

    result
}

/// Collapse duplicate fingerprints (first wins) and make names unique.
pub fn deduplicate(nodes: Vec<ProxyNode>) -> Vec<ProxyNode> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        if seen.insert(fingerprint(&node)) {
            kept.push(node);
        }
    }
    ensure_unique_names(kept)
}

/// The unique node names of a list, in order.
pub fn node_names(nodes: &[ProxyNode]) -> Vec<String> {
    document::unique_items(nodes.iter().map(node_name).collect())
}
