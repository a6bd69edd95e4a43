//! Planning decision
//!
//! The structured output of one planning round: the actions to run next,
//! with their parameters, plus the model's textual response and reasoning.
//! An empty `nextActions` list is the only way the model ends the loop.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name under which the decision schema is handed to model adapters
pub const DECISION_SCHEMA_NAME: &str = "planning_decision";

/// One action the model wants to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    pub action_id: String,

    #[serde(default)]
    pub parameters: Value,
}

impl ProposedAction {
    pub fn new(action_id: impl Into<String>, parameters: Value) -> Self {
        Self {
            action_id: action_id.into(),
            parameters,
        }
    }
}

/// Textual part of a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    /// Answer for the user. Only authoritative when `nextActions` is empty.
    #[serde(default)]
    pub text_response: String,

    /// Why these actions were chosen
    #[serde(default)]
    pub reasoning: String,

    /// Why these parameters were chosen
    #[serde(default)]
    pub parameters_reasoning: String,
}

/// Output of one planning round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningDecision {
    #[serde(default)]
    pub next_actions: Vec<ProposedAction>,

    #[serde(default)]
    pub response: DecisionResponse,
}

impl PlanningDecision {
    /// A decision that ends the loop with `text`
    pub fn finish(text: impl Into<String>) -> Self {
        Self {
            next_actions: Vec::new(),
            response: DecisionResponse {
                text_response: text.into(),
                ..Default::default()
            },
        }
    }

    /// A decision that runs `actions`
    pub fn run(actions: Vec<ProposedAction>, reasoning: impl Into<String>) -> Self {
        Self {
            next_actions: actions,
            response: DecisionResponse {
                reasoning: reasoning.into(),
                ..Default::default()
            },
        }
    }

    /// True when the model asked for no further actions
    pub fn is_final(&self) -> bool {
        self.next_actions.is_empty()
    }

    /// Requested action ids, in the order the model listed them
    pub fn action_ids(&self) -> Vec<String> {
        self.next_actions
            .iter()
            .map(|a| a.action_id.clone())
            .collect()
    }
}

/// JSON schema every planning response must satisfy
pub fn decision_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "nextActions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "actionId": {"type": "string", "minLength": 1},
                        "parameters": {"type": ["object", "null"]}
                    },
                    "required": ["actionId"]
                }
            },
            "response": {
                "type": "object",
                "properties": {
                    "textResponse": {"type": "string"},
                    "reasoning": {"type": "string"},
                    "parametersReasoning": {"type": "string"}
                },
                "required": ["textResponse"]
            }
        },
        "required": ["nextActions", "response"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CompiledSchema;

    #[test]
    fn test_decision_roundtrip_shape() {
        let decision = PlanningDecision::run(
            vec![ProposedAction::new("sum", json!({"a": 5, "b": 3}))],
            "add first",
        );
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["nextActions"][0]["actionId"], "sum");
        assert_eq!(value["response"]["reasoning"], "add first");

        let schema = CompiledSchema::compile(decision_schema()).unwrap();
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_schema_rejects_missing_fields() {
        let schema = CompiledSchema::compile(decision_schema()).unwrap();
        assert!(schema.validate(&json!({"nextActions": []})).is_err());
        assert!(schema
            .validate(&json!({"nextActions": [{"parameters": {}}], "response": {"textResponse": ""}}))
            .is_err());
        assert!(schema
            .validate(&json!({"nextActions": "sum", "response": {"textResponse": ""}}))
            .is_err());
    }

    #[test]
    fn test_missing_optional_parts_default() {
        let decision: PlanningDecision = serde_json::from_value(json!({
            "nextActions": [{"actionId": "lookup"}],
            "response": {"textResponse": ""}
        }))
        .unwrap();
        assert_eq!(decision.next_actions[0].parameters, Value::Null);
        assert_eq!(decision.response.reasoning, "");
        assert!(!decision.is_final());
        assert_eq!(decision.action_ids(), vec!["lookup".to_string()]);
    }

    #[test]
    fn test_finish_is_final() {
        let decision = PlanningDecision::finish("7");
        assert!(decision.is_final());
        assert_eq!(decision.response.text_response, "7");
    }
}
