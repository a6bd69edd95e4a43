//! Action input/output and state types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Schema-less state shared across one interaction.
///
/// Keys are ordered so the serialized form handed to the model is stable.
pub type StateBag = BTreeMap<String, Value>;

/// Parameters proposed by the model for one action call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionParams {
    pub params: serde_json::Map<String, Value>,
}

impl ActionParams {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. Anything that is not an object yields an
    /// empty parameter set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(params) => Self { params },
            _ => Self::default(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get an i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get an f64 parameter (integers are widened)
    pub fn param_f64(&self, key: &str) -> Result<f64, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get a bool parameter
    pub fn param_bool(&self, key: &str) -> Result<bool, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Get an optional i64 parameter
    pub fn param_i64_opt(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_i64())
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&Value, ActionError> {
        self.params
            .get(key)
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Deserialize the whole parameter set into a typed struct
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ActionError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| ActionError::InvalidParameter(e.to_string()))
    }

    /// The parameters as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// State changes requested by an action.
///
/// Actions never mutate shared state directly; the loop applies the patch
/// once the action has settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub remove: BTreeSet<String>,
}

impl StatePatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        self.remove.remove(&key);
        self.set.insert(key, value);
        self
    }

    /// Remove a key
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.set.remove(&key);
        self.remove.insert(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Every key this patch touches
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.set.keys().chain(self.remove.iter())
    }

    /// Apply the patch to a state bag
    pub fn apply(&self, state: &mut StateBag) {
        for key in &self.remove {
            state.remove(key);
        }
        for (key, value) in &self.set {
            state.insert(key.clone(), value.clone());
        }
    }
}

/// Output from a successful action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Value reported back to the model in the tool-result message
    pub value: Value,

    /// State changes to merge into the shared state
    #[serde(default, skip_serializing_if = "StatePatch::is_empty")]
    pub patch: StatePatch,
}

impl ActionOutput {
    /// Create an output carrying a value and no state changes
    pub fn value(value: Value) -> Self {
        Self {
            value,
            patch: StatePatch::default(),
        }
    }

    /// Create an output with text
    pub fn text(text: impl Into<String>) -> Self {
        Self::value(Value::String(text.into()))
    }

    /// Create an empty successful output
    pub fn empty() -> Self {
        Self::value(Value::Null)
    }

    /// Attach a state patch
    pub fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = patch;
        self
    }
}

/// Errors raised by an action's own logic
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// Convenience constructor for arbitrary failures
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Outcome of an executed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
}

/// Audit record appended once an action has settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    /// Action id
    pub id: String,

    /// Correlation id of the tool call that ran this action
    pub tool_call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutedAction {
    /// Record a successful execution
    pub fn success(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        parameters: Value,
        result: Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            parameters: Some(parameters),
            result: Some(result),
            status: ActionStatus::Success,
            error_message: None,
        }
    }

    /// Record a failed execution
    pub fn error(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        parameters: Value,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            parameters: Some(parameters),
            result: None,
            status: ActionStatus::Error,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
