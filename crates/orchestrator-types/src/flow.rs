//! Flow definition: nodes and connections submitted with a deployment.
//! Represented as flat arrays plus an adjacency table built at submit time —
//! no pointers between node and connection records, so the only owning
//! reference into a deployment's graph is the coordinator's id-keyed maps.

use crate::ids::FlowNodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRef {
    pub credential_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub node_id: FlowNodeId,
    pub module_id: String,
    pub module_version: String,
    #[serde(default)]
    pub position: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub credential_refs: HashMap<String, CredentialRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCondition {
    /// Dotted path into the source node's output value.
    pub field: String,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: serde_json::Value,
}

fn default_port() -> String {
    "output".to_string()
}

fn default_input_port() -> String {
    "input".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConnection {
    pub source_node_id: FlowNodeId,
    #[serde(default = "default_port")]
    pub source_port: String,
    pub target_node_id: FlowNodeId,
    #[serde(default = "default_input_port")]
    pub target_port: String,
    #[serde(default)]
    pub transform: Option<serde_json::Value>,
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

/// Evaluates an edge condition against a source node's output. A missing
/// field makes every operator false except `exists`, which returns false.
/// This is pinned behavior (spec'd), not a default to be changed.
pub fn evaluate_condition(condition: &EdgeCondition, source_output: &serde_json::Value) -> bool {
    let field_value = dotted_lookup(source_output, &condition.field);

    match (&condition.op, field_value) {
        (ConditionOp::Exists, found) => found.is_some(),
        (_, None) => false,
        (ConditionOp::Eq, Some(v)) => v == &condition.value,
        (ConditionOp::Ne, Some(v)) => v != &condition.value,
        (ConditionOp::Gt, Some(v)) => compare_numbers(v, &condition.value, |a, b| a > b),
        (ConditionOp::Lt, Some(v)) => compare_numbers(v, &condition.value, |a, b| a < b),
        (ConditionOp::Gte, Some(v)) => compare_numbers(v, &condition.value, |a, b| a >= b),
        (ConditionOp::Lte, Some(v)) => compare_numbers(v, &condition.value, |a, b| a <= b),
        (ConditionOp::Contains, Some(v)) => contains(v, &condition.value),
    }
}

fn dotted_lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |cur, key| cur.get(key))
}

fn compare_numbers(a: &serde_json::Value, b: &serde_json::Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match haystack {
        serde_json::Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        serde_json::Value::Array(arr) => arr.contains(needle),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_field_is_false_except_exists() {
        let out = json!({"a": 1});
        let cond = EdgeCondition { field: "b".into(), op: ConditionOp::Eq, value: json!(1) };
        assert!(!evaluate_condition(&cond, &out));
        let cond = EdgeCondition { field: "b".into(), op: ConditionOp::Exists, value: json!(null) };
        assert!(!evaluate_condition(&cond, &out));
    }

    #[test]
    fn dotted_path_lookup() {
        let out = json!({"a": {"b": 5}});
        let cond = EdgeCondition { field: "a.b".into(), op: ConditionOp::Gte, value: json!(5) };
        assert!(evaluate_condition(&cond, &out));
    }
}
