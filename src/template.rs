//! # Template Composition
//!
//! The base template is the operator-maintained skeleton of the final
//! document. Composition replaces its `proxies` wholesale with the
//! deduplicated node list, expands every group's auto-populate marker,
//! and synthesizes a single fallback select group when the template
//! defines none, so the output always has at least one usable group.

use serde_yaml::{Mapping, Value};

use crate::dedup::ProxyNode;
use crate::document::{self, GROUPS_KEY, PROXIES_KEY, RULES_KEY};
use crate::error::Result;
use crate::groups;

/// Built-in default template used when the operator provides none.
///
/// Carries sane engine defaults, the two baseline groups (manual select
/// plus latency auto-test, both auto-populated), and a rule list ending
/// in the terminal catch-all.
pub fn default_template() -> Value {
    serde_yaml::from_str(
        r#"
mixed-port: 17890
socks-port: 7891
allow-lan: true
bind-address: "*"
mode: rule
log-level: info
external-controller: "0.0.0.0:9090"
secret: ""
proxies: []
proxy-groups:
  - name: PROXY
    type: select
    proxies: [AUTO, DIRECT]
    use_all_proxies: true
  - name: AUTO
    type: url-test
    url: http://www.gstatic.com/generate_204
    interval: 300
    tolerance: 50
    proxies: []
    use_all_proxies: true
rules:
  - MATCH,PROXY
"#,
    )
    .expect("built-in template is valid yaml")
}

/// Compose the template and the deduplicated node list into a fresh
/// document.
///
/// The template root must be a mapping; anything else is a structural
/// error. `proxies` is replaced wholly by the node list, every template
/// group goes through auto-populate expansion, and a template with no
/// groups gets a fallback select group over `DIRECT` plus all nodes.
pub fn compose(template: &Value, nodes: &[ProxyNode]) -> Result<Value> {
    let root = document::expect_mapping(template, "template root")?;
    let mut output = root.clone();

    document::set(
        &mut output,
        PROXIES_KEY,
        Value::Sequence(nodes.iter().cloned().map(Value::Mapping).collect()),
    );

    let node_names = crate::dedup::node_names(nodes);
    let template_groups = document::sequence_or_empty(&output, GROUPS_KEY);

    let mut rendered: Vec<Value> = template_groups
        .iter()
        .filter_map(Value::as_mapping)
        .map(|group| Value::Mapping(groups::expand_auto_populate(group, &node_names)))
        .collect();

    if rendered.is_empty() {
        let mut members = vec![groups::DIRECT_NODE.to_string()];
        members.extend(node_names);
        let mut fallback = Mapping::new();
        document::set(&mut fallback, "name", Value::String("PROXY".to_string()));
        document::set(&mut fallback, "type", Value::String("select".to_string()));
        document::set(
            &mut fallback,
            PROXIES_KEY,
            document::string_sequence(&document::unique_items(members)),
        );
        rendered = vec![Value::Mapping(fallback)];
    }

    document::set(&mut output, GROUPS_KEY, Value::Sequence(rendered));
    Ok(output.into())
}

/// True when the template's rule list ends in a terminal catch-all.
///
/// Used by callers that validate operator templates before accepting
/// them; the pipeline itself preserves whatever terminal rules exist.
pub fn has_terminal_rule(template: &Value) -> bool {
    template
        .as_mapping()
        .map(|root| document::sequence_or_empty(root, RULES_KEY))
        .map(|rules| {
            rules
                .last()
                .and_then(Value::as_str)
                .map(|rule| rule.starts_with("MATCH,"))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}
