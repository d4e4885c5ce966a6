//! # Site Policy Layer
//!
//! The site policy is an operator-authored document carrying extra
//! `groups` and `rules` on top of the composed template. Policy groups
//! get the same auto-populate expansion as template groups, then merge
//! into the existing group list by name; policy rules insert ahead of the
//! existing non-terminal rules.

use serde_yaml::Value;

use crate::document::{self, GROUPS_KEY, RULES_KEY};
use crate::error::Result;
use crate::groups;
use crate::rules;

/// Merge a site-policy document into the current document.
///
/// Either `groups` or `rules` may be absent or empty. A policy document
/// that is not a mapping is treated as empty (operator files degrade to
/// no-ops, they do not abort runs).
pub fn apply(config: &Value, site_policy: &Value, node_names: &[String]) -> Result<Value> {
    let root = document::expect_mapping(config, "document root")?;
    let mut output = root.clone();

    let Some(policy) = site_policy.as_mapping() else {
        return Ok(output.into());
    };

    let policy_groups: Vec<Value> = document::sequence_or_empty(policy, "groups")
        .iter()
        .filter_map(Value::as_mapping)
        .map(|group| Value::Mapping(groups::expand_auto_populate(group, node_names)))
        .collect();

    if !policy_groups.is_empty() {
        let existing = document::sequence_or_empty(&output, GROUPS_KEY);
        document::set(
            &mut output,
            GROUPS_KEY,
            Value::Sequence(groups::merge_group_lists(&existing, &policy_groups)),
        );
    }

    let policy_rules = document::sequence_or_empty(policy, "rules");
    if !policy_rules.is_empty() {
        let existing = document::sequence_or_empty(&output, RULES_KEY);
        let merged = rules::insert_rules(&existing, &policy_rules);
        document::set(&mut output, RULES_KEY, document::string_sequence(&merged));
    }

    Ok(output.into())
}
