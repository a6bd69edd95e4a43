//! Model Adapter Interface
//!
//! This module provides the uniform contract the task loop uses to get a
//! structured decision out of a language model. Concrete provider clients
//! (OpenAI, Anthropic, Bedrock, Gemini, ...) live outside this crate and
//! implement `ModelAdapter`; the loop only ever sees `complete`.
//!
//! It also defines the transcript types (`Message`, `MessageRole`,
//! `ToolCall`) shared by the planner, the agent loop and the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur during model operations
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No structured content in model response")]
    NoStructuredContent,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Message in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,

    /// Tool call ID for tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Model reasoning attached to an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            reasoning: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_tool_calls(
        content: impl Into<String>,
        reasoning: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let reasoning = reasoning.into();
        Self {
            tool_calls,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            ..Self::with_role(MessageRole::Assistant, content)
        }
    }

    /// Create a new tool result message
    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,

    /// Tool result message
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Tool call declared by an assistant message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,

    /// Id of the action to run
    pub name: String,

    /// Parameters for the action
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Generate a fresh tool call correlation id
pub fn new_tool_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Token counts reported by a provider for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// One structured completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation handed to the model (prompt first)
    pub messages: Vec<Message>,

    /// Name of the response schema (providers that support named schemas use it)
    pub schema_name: String,

    /// JSON schema the response content must satisfy
    pub schema: Value,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,
}

/// Structured completion returned by a provider
#[derive(Debug, Clone)]
pub struct Completion {
    /// Parsed structured content
    pub content: Value,

    /// Token usage for this call
    pub usage: TokenUsage,

    /// Cost already computed by the provider, in cents. When absent the
    /// pricing table is used.
    pub cost_cents: Option<f64>,

    /// Model that actually served the call, when it differs from the
    /// adapter's configured id
    pub model: Option<String>,
}

impl Completion {
    /// Create a completion from content and usage
    pub fn new(content: Value, usage: TokenUsage) -> Self {
        Self {
            content,
            usage,
            cost_cents: None,
            model: None,
        }
    }

    /// Attach a provider-computed cost
    pub fn with_cost_cents(mut self, cost_cents: f64) -> Self {
        self.cost_cents = Some(cost_cents);
        self
    }
}

/// Model adapter trait that all providers must implement
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Returns the model identifier used for pricing and logging
    fn model_id(&self) -> &str;

    /// Request a structured completion
    ///
    /// # Returns
    /// * `Ok(Completion)` - parsed content plus token usage
    /// * `Err(ModelError::NoStructuredContent)` - the provider answered but no
    ///   JSON document could be extracted
    /// * `Err(ModelError)` - any other provider failure
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// Extract the structured JSON document from raw model text.
///
/// Handles the formats models actually produce:
/// 1. Raw JSON (entire content is a JSON object)
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. A JSON object embedded in prose
///
/// Adapters whose provider has no native structured-output mode use this to
/// honour the "fail distinctly" part of the contract.
pub fn parse_structured_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();

    if let Some(value) = try_parse_object(trimmed) {
        return Ok(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = try_parse_object(inner.trim()) {
            return Ok(value);
        }
    }

    // Scan every '{' until one opens a balanced, parseable object
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(value) = try_parse_object(json_str) {
                return Ok(value);
            }
        }
    }

    Err(ModelError::NoStructuredContent)
}

fn try_parse_object(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(|v| v.is_object())
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");
        assert_eq!(user_msg.tool_call_id, None);

        let system_msg = Message::system("You are a helpful assistant");
        assert_eq!(system_msg.role, MessageRole::System);

        let tool_msg = Message::tool_result("result", "call_123");
        assert_eq!(tool_msg.role, MessageRole::Tool);
        assert_eq!(tool_msg.tool_call_id, Some("call_123".to_string()));
    }

    #[test]
    fn test_assistant_tool_calls_message() {
        let msg = Message::assistant_tool_calls(
            "",
            "need the sum first",
            vec![ToolCall::new("call_1", "sum", json!({"a": 1, "b": 2}))],
        );
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.reasoning.as_deref(), Some("need the sum first"));

        let silent = Message::assistant_tool_calls("", "", vec![]);
        assert!(silent.reasoning.is_none());
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("reasoning"));

        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = new_tool_call_id();
        let b = new_tool_call_id();
        assert!(a.starts_with("call_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_raw_json() {
        let value = parse_structured_content(r#"{"nextActions": []}"#).unwrap();
        assert_eq!(value, json!({"nextActions": []}));
    }

    #[test]
    fn test_parse_fenced_json_with_trailing_text() {
        let content = "Here you go:\n```json\n{\"a\": 1}\n```\nAnything else?";
        assert_eq!(parse_structured_content(content).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let content = r#"I think {not json} but then {"a": {"b": "}"}} done"#;
        assert_eq!(
            parse_structured_content(content).unwrap(),
            json!({"a": {"b": "}"}})
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            parse_structured_content("[1, 2, 3]"),
            Err(ModelError::NoStructuredContent)
        ));
        assert!(matches!(
            parse_structured_content("plain prose only"),
            Err(ModelError::NoStructuredContent)
        ));
    }
}
