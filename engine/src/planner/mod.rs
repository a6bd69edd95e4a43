//! Planner
//!
//! Turns the current interaction into a model call and parses the structured
//! decision that comes back. Every call reports its usage to the cost
//! accountant and emits a planning event, whether it succeeds or not.
//!
//! Any failure here (adapter error, content that does not match the schema)
//! is a `Planning` error and ends the interaction.

pub mod decision;
pub mod prompt;

pub use decision::{decision_schema, DecisionResponse, PlanningDecision, ProposedAction};
pub use prompt::{FormatPrompt, PlanningPrompt};

use crate::costs::CostAccountant;
use crate::events::{EventStatus, EventUsage, LogEvent, LogEventKind, LogSink};
use crate::llm::{CompletionRequest, Message, MessageRole, ModelAdapter};
use crate::schema::CompiledSchema;
use sdk::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Structured response format requested by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Schema name handed to the model adapter
    pub name: String,

    /// JSON schema the final response must satisfy
    pub schema: Value,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Per-call bookkeeping the planner reports into
pub struct PlanningScope<'a> {
    pub session_id: &'a str,
    pub interaction_id: &'a str,
    pub step: u32,
    pub accountant: &'a mut CostAccountant,
    pub sink: &'a dyn LogSink,
}

/// What one model call produced, before interpretation
struct CallRecord {
    content: Value,
    prompt: String,
}

/// Planner bound to one model adapter
pub struct Planner {
    model: Arc<dyn ModelAdapter>,
    decision_schema: CompiledSchema,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Planner {
    pub fn new(model: Arc<dyn ModelAdapter>) -> Result<Self, AgentError> {
        let decision_schema = CompiledSchema::compile(decision_schema())
            .map_err(|e| AgentError::Planning(format!("Invalid decision schema: {}", e)))?;

        Ok(Self {
            model,
            decision_schema,
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Ask the model for the next actions.
    ///
    /// `transcript` is the conversation so far; its system messages are
    /// replaced by the rendered planning prompt.
    pub async fn generate_decision(
        &self,
        scope: &mut PlanningScope<'_>,
        transcript: &[Message],
        prompt: &PlanningPrompt<'_>,
    ) -> Result<PlanningDecision, AgentError> {
        let rendered = prompt.render();
        let record = self
            .call(
                scope,
                LogEventKind::PlanNextActions,
                transcript,
                rendered,
                decision::DECISION_SCHEMA_NAME,
                self.decision_schema.source().clone(),
            )
            .await?;

        let decision = self
            .decision_schema
            .validate(&record.content)
            .map_err(|e| format!("Model response does not match the decision schema: {}", e))
            .and_then(|_| {
                serde_json::from_value::<PlanningDecision>(record.content.clone())
                    .map_err(|e| format!("Failed to parse planning decision: {}", e))
            });

        match decision {
            Ok(decision) => {
                debug!(
                    "Planning step {}: {} actions proposed ({})",
                    scope.step,
                    decision.next_actions.len(),
                    decision.response.reasoning
                );
                Ok(decision)
            }
            Err(message) => {
                error!("{}", message);
                scope.sink.emit(
                    LogEvent::new(
                        LogEventKind::PlanNextActions,
                        scope.session_id,
                        scope.interaction_id,
                    )
                    .step(scope.step)
                    .status(EventStatus::Error)
                    .data(json!({
                        "error": message,
                        "prompt": record.prompt,
                        "response": record.content,
                    })),
                );
                Err(AgentError::Planning(message))
            }
        }
    }

    /// Ask the model for the final response in the requested format.
    ///
    /// The result is validated against `format.schema`.
    pub async fn format_response(
        &self,
        scope: &mut PlanningScope<'_>,
        transcript: &[Message],
        format: &ResponseFormat,
        prompt: &FormatPrompt<'_>,
    ) -> Result<Value, AgentError> {
        let schema = CompiledSchema::compile(format.schema.clone()).map_err(|e| {
            AgentError::Planning(format!(
                "Invalid response format schema '{}': {}",
                format.name, e
            ))
        })?;

        let record = self
            .call(
                scope,
                LogEventKind::PlanFinalResponse,
                transcript,
                prompt.render(),
                &format.name,
                format.schema.clone(),
            )
            .await?;

        schema.validate(&record.content).map_err(|e| {
            let message = format!(
                "Final response does not match the '{}' schema: {}",
                format.name, e
            );
            error!("{}", message);
            AgentError::Planning(message)
        })?;

        Ok(record.content)
    }

    /// One model call: build the request, account for it, emit the event.
    async fn call(
        &self,
        scope: &mut PlanningScope<'_>,
        kind: LogEventKind,
        transcript: &[Message],
        prompt: String,
        schema_name: &str,
        schema: Value,
    ) -> Result<CallRecord, AgentError> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system(prompt.clone()));
        messages.extend(
            transcript
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );

        let request = CompletionRequest {
            messages,
            schema_name: schema_name.to_string(),
            schema,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let started = Instant::now();
        let result = self.model.complete(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let event = LogEvent::new(kind, scope.session_id, scope.interaction_id)
            .step(scope.step)
            .duration_ms(duration_ms);

        match result {
            Ok(completion) => {
                let model = completion
                    .model
                    .clone()
                    .unwrap_or_else(|| self.model.model_id().to_string());
                let cost_cents =
                    scope
                        .accountant
                        .record(&model, completion.usage, completion.cost_cents);

                scope.sink.emit(
                    event
                        .usage(EventUsage {
                            prompt_tokens: completion.usage.input_tokens,
                            completion_tokens: completion.usage.output_tokens,
                            cost_cents,
                        })
                        .data(json!({
                            "model": model,
                            "prompt": prompt,
                            "response": completion.content,
                            "reasoning": completion.content
                                .pointer("/response/reasoning")
                                .cloned()
                                .unwrap_or(Value::Null),
                        })),
                );

                Ok(CallRecord {
                    content: completion.content,
                    prompt,
                })
            }
            Err(e) => {
                error!("Model call on {} failed: {}", self.model.model_id(), e);
                scope.sink.emit(
                    event.status(EventStatus::Error).data(json!({
                        "model": self.model.model_id(),
                        "prompt": prompt,
                        "error": e.to_string(),
                    })),
                );
                Err(AgentError::Planning(e.to_string()))
            }
        }
    }
}
