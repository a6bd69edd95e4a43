//! Interaction transcript
//!
//! Ordered, append-only message history of one interaction. It is both the
//! conversation handed to the model and the audit trail returned to the
//! caller, so nothing is ever trimmed or rewritten. Every tool-result message
//! must answer a tool call declared by an earlier assistant message.

use crate::llm::{Message, MessageRole};
use std::collections::HashSet;

/// Append-only message history
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an interaction: system message, prior conversation, then the
    /// new user input.
    ///
    /// System messages inside `prior` are dropped; the new system message
    /// replaces them.
    pub fn start(system: impl Into<String>, prior: Vec<Message>, input: &str) -> Self {
        let mut transcript = Self::new();
        transcript.push(Message::system(system));
        for message in prior {
            if message.role != MessageRole::System {
                transcript.push(message);
            }
        }
        transcript.push(Message::user(input));
        transcript
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Tool-call ids declared by assistant messages that have no result yet
    pub fn pending_tool_calls(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .filter(|call| !answered.contains(call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    }

    /// Content of the most recent assistant message with text
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.trim())
            .find(|content| !content.is_empty())
    }
}
