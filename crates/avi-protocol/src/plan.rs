//! Action plans returned by the remote planner.
//!
//! Wire shape:
//! `{"actions":[{"id":..,"function":..,"args":{..},"condition":..|null}]}`

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Prefix of a reference to an earlier action's result.
pub const RESULT_REF_PREFIX: &str = "$result.";

/// One function invocation in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique within the plan.
    pub id: String,
    /// Dot-qualified function name, e.g. `light.set`.
    pub function: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Boolean expression over earlier results, e.g. `$result.price.value > 200`.
    #[serde(default)]
    pub condition: Option<String>,
}

/// Ordered, conditionally-branching list of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
}

impl ActionPlan {
    /// Decode a plan from pure JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Check plan invariants: at least one action, unique ids, and every
    /// `$result.<id>` reference names an action that appears earlier.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.actions.is_empty() {
            return Err(ProtocolError::InvalidPlan("plan has no actions".into()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for action in &self.actions {
            if action.id.is_empty() {
                return Err(ProtocolError::InvalidPlan(format!(
                    "action calling '{}' has an empty id",
                    action.function
                )));
            }

            let mut refs = Vec::new();
            if let Some(condition) = &action.condition {
                refs.extend(result_references(condition));
            }
            for value in action.args.values() {
                collect_value_references(value, &mut refs);
            }

            for referenced in refs {
                if !seen.contains(referenced) {
                    return Err(ProtocolError::InvalidPlan(format!(
                        "action '{}' references '{referenced}' which is not an earlier action",
                        action.id
                    )));
                }
            }

            if !seen.insert(action.id.as_str()) {
                return Err(ProtocolError::InvalidPlan(format!(
                    "duplicate action id '{}'",
                    action.id
                )));
            }
        }
        Ok(())
    }
}

fn collect_value_references<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.extend(result_references(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_value_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_value_references(v, out)),
        _ => {}
    }
}

/// Action ids referenced as `$result.<id>` in a text fragment.
pub fn result_references(text: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(RESULT_REF_PREFIX) {
        let after = &rest[pos + RESULT_REF_PREFIX.len()..];
        let end = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        if end > 0 {
            refs.push(&after[..end]);
        }
        rest = &after[end..];
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_minimal_action() {
        let plan =
            ActionPlan::from_json(r#"{"actions":[{"id":"a","function":"say","args":{"text":"hi"}}]}"#)
                .unwrap();
        assert_eq!(plan.actions.len(), 1);
        let action = &plan.actions[0];
        assert_eq!(action.id, "a");
        assert_eq!(action.function, "say");
        assert_eq!(Value::Object(action.args.clone()), json!({"text": "hi"}));
        assert!(action.condition.is_none());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn serializes_null_condition() {
        let plan = ActionPlan::from_json(r#"{"actions":[{"id":"a","function":"say"}]}"#).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json["actions"][0]["condition"].is_null());
        assert_eq!(json["actions"][0]["args"], json!({}));
    }

    #[test]
    fn extracts_result_references() {
        assert_eq!(
            result_references("$result.get_price.price > 200 && $result.b-2.ok"),
            vec!["get_price", "b-2"]
        );
        assert!(result_references("no refs here $result.").is_empty());
    }

    #[test]
    fn backward_references_are_valid() {
        let plan: ActionPlan = serde_json::from_value(json!({"actions": [
            {"id": "fetch", "function": "stock.get_price", "args": {"symbol": "AAPL"}},
            {"id": "lights", "function": "light.set", "args": {"state": "on"},
             "condition": "$result.fetch.price > 200"},
            {"id": "announce", "function": "say",
             "args": {"text": "Apple is at $result.fetch.price"}}
        ]}))
        .unwrap();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn forward_reference_in_condition_is_invalid() {
        let plan: ActionPlan = serde_json::from_value(json!({"actions": [
            {"id": "announce", "function": "say", "args": {"text": "hi"},
             "condition": "$result.fetch.price > 200"},
            {"id": "fetch", "function": "stock.get_price", "args": {}}
        ]}))
        .unwrap();
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("fetch"));
    }

    #[test]
    fn self_reference_in_nested_args_is_invalid() {
        let plan: ActionPlan = serde_json::from_value(json!({"actions": [
            {"id": "a", "function": "say", "args": {"parts": [{"text": "$result.a.text"}]}}
        ]}))
        .unwrap();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn duplicate_ids_are_invalid() {
        let plan: ActionPlan = serde_json::from_value(json!({"actions": [
            {"id": "a", "function": "say"},
            {"id": "a", "function": "listen"}
        ]}))
        .unwrap();
        assert!(plan.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn empty_plan_is_invalid() {
        let plan = ActionPlan { actions: vec![] };
        assert!(plan.validate().is_err());
    }
}
