//! # Proxy Group Merging and Sanitizing
//!
//! Groups are named selection policies over nodes. They merge by name
//! across layers: the later layer's non-member fields win, member lists
//! (`proxies`) union order-preserving. The `use_all_proxies` marker is a
//! build-time directive that expands to the full node-name list and is
//! never emitted into the final document.
//!
//! The sanitizer runs last: the engine rejects any group without a
//! non-empty `proxies` or `use` source, so such groups are repaired with
//! a fallback member list (all nodes plus `DIRECT`). Groups are never
//! removed or renamed here.

use serde_yaml::{Mapping, Value};

use crate::document;

/// Build-time marker on a group: union all node names into its members.
const USE_ALL_PROXIES_KEY: &str = "use_all_proxies";

/// The direct-connection pseudo-node every engine understands.
pub const DIRECT_NODE: &str = "DIRECT";

fn group_name(group: &Mapping) -> Option<String> {
    match document::get(group, "name") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Merge an incoming group list into an existing one by group name.
///
/// Unknown incoming entries (non-mappings, nameless groups) are dropped.
/// On a name collision the incoming group's non-`proxies` fields replace
/// the existing ones and the member lists union, existing members first.
/// Output order: existing groups in order, then new names in order of
/// first appearance.
pub fn merge_group_lists(existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: std::collections::HashMap<String, Mapping> = std::collections::HashMap::new();

    for value in existing {
        if let Value::Mapping(group) = value {
            if let Some(name) = group_name(group) {
                if !by_name.contains_key(&name) {
                    order.push(name.clone());
                }
                by_name.insert(name, group.clone());
            }
        }
    }

    for value in incoming {
        let Value::Mapping(group) = value else {
            continue;
        };
        let Some(name) = group_name(group) else {
            continue;
        };

        if !by_name.contains_key(&name) {
            order.push(name.clone());
            by_name.insert(name, group.clone());
            continue;
        }

        let current = by_name.get_mut(&name).expect("checked contains_key");
        // A missing member list unions like an empty one; a wrong-typed
        // value opts the group out of the union and keeps what it had.
        let existing_members = document::get(current, "proxies")
            .cloned()
            .unwrap_or_else(|| Value::Sequence(Vec::new()));
        let incoming_members = document::get(group, "proxies")
            .cloned()
            .unwrap_or_else(|| Value::Sequence(Vec::new()));

        for (key, value) in group {
            if key.as_str() == Some("proxies") {
                continue;
            }
            current.insert(key.clone(), value.clone());
        }

        if let (Value::Sequence(old), Value::Sequence(new)) =
            (existing_members, incoming_members)
        {
            let mut merged = document::string_items(&old);
            merged.extend(document::string_items(&new));
            document::set(
                current,
                "proxies",
                document::string_sequence(&document::unique_items(merged)),
            );
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .map(Value::Mapping)
        .collect()
}

/// Expand the auto-populate marker on one group.
///
/// When `use_all_proxies` is truthy, the full node-name list is unioned
/// into the group's members. The marker itself is always stripped.
pub fn expand_auto_populate(group: &Mapping, node_names: &[String]) -> Mapping {
    let mut cloned = group.clone();
    let use_all = cloned
        .remove(Value::String(USE_ALL_PROXIES_KEY.to_string()))
        .map(|v| v.as_bool().unwrap_or(false))
        .unwrap_or(false);

    if use_all {
        let mut members = match document::get(&cloned, "proxies") {
            Some(Value::Sequence(seq)) => document::string_items(seq),
            _ => Vec::new(),
        };
        members.extend(node_names.iter().cloned());
        document::set(
            &mut cloned,
            "proxies",
            document::string_sequence(&document::unique_items(members)),
        );
    }
    cloned
}

/// Repair every group so it has at least one member source.
///
/// `use` and `proxies` lists are trimmed and deduplicated; lists that end
/// up empty are removed. A group left with neither gets the fallback
/// member list: all known node names plus `DIRECT`.
pub fn sanitize_groups(groups: &[Value], node_names: &[String]) -> Vec<Value> {
    let mut fallback = node_names.to_vec();
    fallback.push(DIRECT_NODE.to_string());
    let fallback = document::unique_items(fallback);

    let mut fixed = Vec::with_capacity(groups.len());
    for value in groups {
        let Value::Mapping(group) = value else {
            continue;
        };
        let mut current = group.clone();

        for key in ["use", "proxies"] {
            if let Some(Value::Sequence(items)) = document::get(&current, key) {
                let cleaned = document::unique_items(document::string_items(items));
                if cleaned.is_empty() {
                    current.remove(Value::String(key.to_string()));
                } else {
                    document::set(&mut current, key, document::string_sequence(&cleaned));
                }
            }
        }

        let has_use = matches!(document::get(&current, "use"), Some(Value::Sequence(s)) if !s.is_empty());
        let has_proxies =
            matches!(document::get(&current, "proxies"), Some(Value::Sequence(s)) if !s.is_empty());
        if !has_use && !has_proxies {
            document::set(&mut current, "proxies", document::string_sequence(&fallback));
        }

        fixed.push(Value::Mapping(current));
    }
    fixed
}
