//! # Override Layer
//!
//! A general recursive merge of the operator's static override document
//! onto the composed document. Three keys get list-aware treatment:
//!
//! - `proxy-groups` merges by group name (members union, later
//!   non-member fields win),
//! - `rules` goes through rule-insertion ordering (terminal rules stay
//!   last),
//! - `proxies` concatenates and re-runs deduplication over the combined
//!   list.
//!
//! Every other key recurses when both sides are mappings and replaces
//! otherwise. Applying the same override twice to an unchanged base
//! yields the same document as applying it once.

use serde_yaml::Value;

use crate::dedup;
use crate::document::{self, GROUPS_KEY, PROXIES_KEY, RULES_KEY};
use crate::error::Result;
use crate::groups;
use crate::rules;

/// Deep-merge an override document into the current document.
///
/// The base document root must be a mapping. A non-mapping override is
/// treated as empty.
pub fn deep_merge(base: &Value, override_doc: &Value) -> Result<Value> {
    let root = document::expect_mapping(base, "document root")?;
    let mut output = root.clone();

    let Some(override_map) = override_doc.as_mapping() else {
        return Ok(output.into());
    };

    for (key, value) in override_map {
        match key.as_str() {
            Some(GROUPS_KEY) => {
                let base_groups = document::sequence_or_empty(&output, GROUPS_KEY);
                let incoming = value.as_sequence().cloned().unwrap_or_default();
                document::set(
                    &mut output,
                    GROUPS_KEY,
                    Value::Sequence(groups::merge_group_lists(&base_groups, &incoming)),
                );
            }
            Some(RULES_KEY) => {
                let base_rules = document::sequence_or_empty(&output, RULES_KEY);
                let incoming = value.as_sequence().cloned().unwrap_or_default();
                let merged = rules::insert_rules(&base_rules, &incoming);
                document::set(&mut output, RULES_KEY, document::string_sequence(&merged));
            }
            Some(PROXIES_KEY) => {
                let mut combined: Vec<dedup::ProxyNode> =
                    document::sequence_or_empty(&output, PROXIES_KEY)
                        .iter()
                        .filter_map(Value::as_mapping)
                        .cloned()
                        .collect();
                if let Some(incoming) = value.as_sequence() {
                    combined.extend(incoming.iter().filter_map(Value::as_mapping).cloned());
                }
                document::set(
                    &mut output,
                    PROXIES_KEY,
                    Value::Sequence(
                        dedup::deduplicate(combined)
                            .into_iter()
                            .map(Value::Mapping)
                            .collect(),
                    ),
                );
            }
            _ => {
                let merged = match (output.get(key), value) {
                    (Some(Value::Mapping(_)), Value::Mapping(_)) => {
                        let current = output.get(key).expect("present").clone();
                        deep_merge(&current, value)?
                    }
                    // Scalars, sequences and type mismatches all replace.
                    _ => value.clone(),
                };
                output.insert(key.clone(), merged);
            }
        }
    }

    Ok(output.into())
}
