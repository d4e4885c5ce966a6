//! # Document Model
//!
//! The pipeline threads one value type through every stage: a
//! `serde_yaml::Value` tree rooted at a mapping. This module provides the
//! fail-closed accessors the stages use instead of ad-hoc coercion: where
//! a stage requires a mapping and finds a scalar, it gets an
//! `Error::Document` rather than a silently empty view.
//!
//! It also centralizes document I/O: loading optional YAML documents with
//! defaults (an absent or unreadable operator file is never an error) and
//! serializing with a trailing newline.

use std::path::Path;

use log::warn;
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Key under the document root holding the node list.
pub const PROXIES_KEY: &str = "proxies";
/// Key under the document root holding the group list.
pub const GROUPS_KEY: &str = "proxy-groups";
/// Key under the document root holding the rule list.
pub const RULES_KEY: &str = "rules";

/// A human-readable type name for a YAML value, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Sequence(_) => "Sequence",
        Value::Mapping(_) => "Mapping",
        Value::Tagged(_) => "Tagged",
    }
}

/// Require a value to be a mapping, failing closed otherwise.
pub fn expect_mapping<'a>(value: &'a Value, context: &str) -> Result<&'a Mapping> {
    value.as_mapping().ok_or_else(|| Error::Document {
        context: context.to_string(),
        message: format!("expected Mapping, found {}", type_name(value)),
    })
}

/// Mutable variant of [`expect_mapping`].
pub fn expect_mapping_mut<'a>(value: &'a mut Value, context: &str) -> Result<&'a mut Mapping> {
    if value.is_mapping() {
        Ok(value.as_mapping_mut().expect("checked is_mapping"))
    } else {
        Err(Error::Document {
            context: context.to_string(),
            message: format!("expected Mapping, found {}", type_name(value)),
        })
    }
}

/// Fetch a sequence under a mapping key, treating absence or a
/// wrong-typed value as empty.
///
/// Layer inputs are operator-authored; a missing `rules:` key or a
/// scalar where a list belongs means "nothing to merge", not an abort.
pub fn sequence_or_empty(root: &Mapping, key: &str) -> Vec<Value> {
    match root.get(Value::String(key.to_string())) {
        Some(Value::Sequence(seq)) => seq.clone(),
        _ => Vec::new(),
    }
}

/// Extract the non-empty string items of a sequence, trimmed.
pub fn string_items(seq: &[Value]) -> Vec<String> {
    seq.iter()
        .filter_map(|item| item.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deduplicate string items by exact value, first occurrence wins.
pub fn unique_items(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            result.push(item);
        }
    }
    result
}

/// Shorthand for a string-keyed mapping lookup.
pub fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Shorthand for a string-keyed mapping insert.
pub fn set(map: &mut Mapping, key: &str, value: Value) {
    map.insert(Value::String(key.to_string()), value);
}

/// Build a `Value::Sequence` of strings.
pub fn string_sequence(items: &[String]) -> Value {
    Value::Sequence(items.iter().cloned().map(Value::String).collect())
}

/// Load a YAML document from disk, falling back to a default.
///
/// Absence is not an error: operator policy files are all optional. An
/// unreadable or unparsable file is logged and treated as absent so a
/// broken policy document degrades to defaults instead of killing runs.
pub fn load_yaml_or(path: &Path, default: Value) -> Value {
    if !path.exists() {
        return default;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_yaml::from_str::<Value>(&text) {
            Ok(Value::Null) => default,
            Ok(value) => value,
            Err(err) => {
                warn!("failed to parse yaml {}: {}", path.display(), err);
                default
            }
        },
        Err(err) => {
            warn!("failed to read {}: {}", path.display(), err);
            default
        }
    }
}

/// Read an optional text file; absence or failure yields an empty string.
pub fn load_text_or_empty(path: &Path) -> String {
    if !path.exists() {
        return String::new();
    }
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("failed to read {}: {}", path.display(), err);
            String::new()
        }
    }
}

/// Serialize a document to YAML text with a trailing newline.
pub fn to_yaml_string(value: &Value) -> Result<String> {
    let mut text = serde_yaml::to_string(value)?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_expect_mapping_accepts_mapping() {
        let value = mapping("a: 1");
        assert!(expect_mapping(&value, "root").is_ok());
    }

    #[test]
    fn test_expect_mapping_rejects_sequence() {
        let value = mapping("- a");
        let err = expect_mapping(&value, "root").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("expected Mapping"));
        assert!(display.contains("Sequence"));
    }

    #[test]
    fn test_expect_mapping_mut_rejects_scalar() {
        let mut value = Value::String("nope".to_string());
        assert!(expect_mapping_mut(&mut value, "root").is_err());
    }

    #[test]
    fn test_sequence_or_empty_missing_key() {
        let value = mapping("a: 1");
        let root = value.as_mapping().unwrap();
        assert!(sequence_or_empty(root, "rules").is_empty());
    }

    #[test]
    fn test_sequence_or_empty_wrong_type() {
        let value = mapping("rules: not-a-list");
        let root = value.as_mapping().unwrap();
        assert!(sequence_or_empty(root, "rules").is_empty());
    }

    #[test]
    fn test_string_items_trims_and_drops_non_strings() {
        let value = mapping("- '  a  '\n- ''\n- 3\n- b");
        let items = string_items(value.as_sequence().unwrap());
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unique_items_first_wins() {
        let items = vec!["a".into(), "b".into(), "a".into(), "c".into(), "b".into()];
        assert_eq!(unique_items(items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_load_yaml_or_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let value = load_yaml_or(&tmp.path().join("absent.yaml"), mapping("d: 1"));
        assert_eq!(value, mapping("d: 1"));
    }

    #[test]
    fn test_load_yaml_or_invalid_yaml_falls_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.yaml");
        std::fs::write(&path, "a: [unclosed").unwrap();
        let value = load_yaml_or(&path, Value::Mapping(Mapping::new()));
        assert_eq!(value, Value::Mapping(Mapping::new()));
    }

    #[test]
    fn test_load_yaml_or_empty_file_falls_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.yaml");
        std::fs::write(&path, "").unwrap();
        let value = load_yaml_or(&path, mapping("d: 1"));
        assert_eq!(value, mapping("d: 1"));
    }

    #[test]
    fn test_to_yaml_string_trailing_newline() {
        let text = to_yaml_string(&mapping("a: 1")).unwrap();
        assert!(text.ends_with('\n'));
    }
}
