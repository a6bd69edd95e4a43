//! Task loop
//!
//! Drives one interaction through its states:
//!
//! ```text
//! PLANNING -> EXECUTING -> (PLANNING | FINALIZING) -> DONE
//! ```
//!
//! Any planning-level failure (model error, invalid decision, unknown action,
//! dependency cycle) leaves the loop immediately: an `interaction_failed`
//! event is emitted and the error is returned to the caller. Action failures
//! never reach this level; the executor turns them into audit entries.

use std::sync::Arc;
use std::time::Instant;

use sdk::AgentError;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::Context;
use super::executor::{RoundExecutor, Schedule};
use super::transcript::Transcript;
use super::{Agent, AgentResponse, FinalResponse};
use crate::costs::CostAccountant;
use crate::events::{EventStatus, EventUsage, LogEvent, LogEventKind};
use crate::llm::Message;
use crate::planner::prompt::system_message;
use crate::planner::{FormatPrompt, PlanningDecision, PlanningPrompt, PlanningScope, ResponseFormat};

/// Everything one interaction starts from
pub(super) struct InteractionRequest {
    pub session_id: String,
    pub context: Context,
    pub messages: Vec<Message>,
    pub response_format: Option<ResponseFormat>,
}

/// Loop states
enum LoopState {
    Planning,
    Executing(Schedule),
    Finalizing,
    Done(FinalResponse),
}

/// Mutable bookkeeping of a running interaction
struct Interaction<'a> {
    agent: &'a Agent,
    session_id: String,
    interaction_id: String,
    started: Instant,
    accountant: CostAccountant,
    transcript: Transcript,

    /// Execution rounds completed
    step: u32,

    /// Set when the step budget ran out
    truncated: bool,

    /// Text of the decision that ended the loop
    final_text: Option<String>,
}

/// Run one interaction to completion
pub(super) async fn run_interaction(
    agent: &Agent,
    request: InteractionRequest,
) -> Result<AgentResponse, AgentError> {
    let InteractionRequest {
        session_id,
        mut context,
        messages,
        response_format,
    } = request;

    let mut interaction = Interaction {
        agent,
        session_id,
        interaction_id: Uuid::new_v4().to_string(),
        started: Instant::now(),
        accountant: CostAccountant::new(Arc::clone(&agent.pricing)),
        transcript: Transcript::start(
            system_message(&agent.instructions, &agent.catalog),
            messages,
            &context.input,
        ),
        step: 0,
        truncated: false,
        final_text: None,
    };

    info!(
        "Starting interaction {} (session {}, rerun: {})",
        interaction.interaction_id,
        interaction.session_id,
        context.is_rerun()
    );
    interaction.emit(
        LogEvent::new(
            LogEventKind::InteractionStart,
            &interaction.session_id,
            &interaction.interaction_id,
        )
        .status(EventStatus::Started)
        .data(json!({
            "input": context.input,
            "state": context.state,
            "isRerun": context.is_rerun(),
            "maxSteps": agent.max_steps,
            "model": agent.planner.model_id(),
        })),
    );

    match interaction.drive(&mut context, response_format.as_ref()).await {
        Ok(response) => Ok(interaction.complete(response, context)),
        Err(e) => {
            interaction.fail(&e);
            Err(e)
        }
    }
}

impl Interaction<'_> {
    async fn drive(
        &mut self,
        context: &mut Context,
        response_format: Option<&ResponseFormat>,
    ) -> Result<FinalResponse, AgentError> {
        let mut state = LoopState::Planning;

        loop {
            state = match state {
                LoopState::Planning => {
                    let decision = self.plan(context).await?;
                    if decision.is_final() {
                        let text = decision.response.text_response.trim().to_string();
                        if !text.is_empty() {
                            self.transcript.push(Message::assistant(text.clone()));
                        }
                        self.final_text = Some(text);
                        LoopState::Finalizing
                    } else {
                        LoopState::Executing(self.schedule(&decision, context)?)
                    }
                }
                LoopState::Executing(schedule) => {
                    let executor = RoundExecutor {
                        registry: &self.agent.registry,
                        sink: self.agent.sink.as_ref(),
                        session_id: &self.session_id,
                        interaction_id: &self.interaction_id,
                    };
                    let outcome = executor
                        .execute(schedule, self.step, context, &mut self.transcript)
                        .await;
                    self.step += 1;

                    info!(
                        "Round {} of interaction {}: {} succeeded, {} failed, {} skipped",
                        self.step,
                        self.interaction_id,
                        outcome.succeeded,
                        outcome.failed,
                        outcome.skipped
                    );

                    if self.step >= self.agent.max_steps {
                        warn!(
                            "Interaction {} reached the step budget ({}); finalizing",
                            self.interaction_id, self.agent.max_steps
                        );
                        self.truncated = true;
                        LoopState::Finalizing
                    } else {
                        LoopState::Planning
                    }
                }
                LoopState::Finalizing => {
                    LoopState::Done(self.finalize(context, response_format).await?)
                }
                LoopState::Done(response) => return Ok(response),
            };
        }
    }

    async fn plan(&mut self, context: &Context) -> Result<PlanningDecision, AgentError> {
        let prompt = PlanningPrompt {
            instructions: &self.agent.instructions,
            input: &context.input,
            catalog: &self.agent.catalog,
            state: &context.state,
            executed_actions: &context.executed_actions,
            previous_interactions_actions: context.previous_interactions_actions.as_deref(),
            step: self.step,
            max_steps: self.agent.max_steps,
        };
        let mut scope = PlanningScope {
            session_id: &self.session_id,
            interaction_id: &self.interaction_id,
            step: self.step,
            accountant: &mut self.accountant,
            sink: self.agent.sink.as_ref(),
        };

        self.agent
            .planner
            .generate_decision(&mut scope, self.transcript.messages(), &prompt)
            .await
    }

    fn schedule(
        &mut self,
        decision: &PlanningDecision,
        context: &Context,
    ) -> Result<Schedule, AgentError> {
        let executor = RoundExecutor {
            registry: &self.agent.registry,
            sink: self.agent.sink.as_ref(),
            session_id: &self.session_id,
            interaction_id: &self.interaction_id,
        };
        executor.schedule(decision, context, &mut self.transcript)
    }

    /// Derive the final response, formatting it when a schema was requested
    async fn finalize(
        &mut self,
        context: &Context,
        response_format: Option<&ResponseFormat>,
    ) -> Result<FinalResponse, AgentError> {
        let text = match self.final_text.take() {
            Some(text) if !text.is_empty() => text,
            _ => match self.transcript.last_assistant_text() {
                Some(text) => text.to_string(),
                None if self.truncated => format!(
                    "Stopped after {} of {} steps without reaching a final answer.",
                    self.step, self.agent.max_steps
                ),
                None => String::new(),
            },
        };

        let Some(format) = response_format else {
            return Ok(FinalResponse::Text(text));
        };

        let prompt = FormatPrompt {
            input: &context.input,
            draft: &text,
            state: &context.state,
            executed_actions: &context.executed_actions,
            schema: &format.schema,
        };
        let mut scope = PlanningScope {
            session_id: &self.session_id,
            interaction_id: &self.interaction_id,
            step: self.step,
            accountant: &mut self.accountant,
            sink: self.agent.sink.as_ref(),
        };
        let value = self
            .agent
            .planner
            .format_response(&mut scope, self.transcript.messages(), format, &prompt)
            .await?;

        self.transcript.push(Message::assistant(value.to_string()));
        Ok(FinalResponse::Structured(value))
    }

    fn complete(self, response: FinalResponse, context: Context) -> AgentResponse {
        let totals = self.accountant.totals();
        let total_duration_ms = self.started.elapsed().as_millis() as u64;

        info!(
            "Interaction {} finished after {} steps in {}ms ({:.4} cents, truncated: {})",
            self.interaction_id, self.step, total_duration_ms, totals.total_cost_cents, self.truncated
        );
        self.emit(
            LogEvent::new(
                LogEventKind::InteractionComplete,
                &self.session_id,
                &self.interaction_id,
            )
            .step(self.step)
            .duration_ms(total_duration_ms)
            .usage(EventUsage {
                prompt_tokens: totals.total_prompt_tokens,
                completion_tokens: totals.total_completion_tokens,
                cost_cents: totals.total_cost_cents,
            })
            .data(json!({
                "response": response,
                "truncated": self.truncated,
                "steps": self.step,
                "modelCalls": totals.model_calls,
                "state": context.state,
                "executedActions": context.executed_actions,
            })),
        );

        AgentResponse {
            response,
            session_id: self.session_id,
            interaction_id: self.interaction_id,
            total_duration_ms,
            total_cost_cents: totals.total_cost_cents,
            total_prompt_tokens: totals.total_prompt_tokens,
            total_completion_tokens: totals.total_completion_tokens,
            context,
            messages: self.transcript.into_messages(),
            truncated: self.truncated,
            steps: self.step,
        }
    }

    fn fail(&self, e: &AgentError) {
        let totals = self.accountant.totals();
        let duration_ms = self.started.elapsed().as_millis() as u64;

        error!(
            "Interaction {} failed at step {}: {}",
            self.interaction_id, self.step, e
        );
        self.emit(
            LogEvent::new(
                LogEventKind::InteractionFailed,
                &self.session_id,
                &self.interaction_id,
            )
            .step(self.step)
            .status(EventStatus::Error)
            .duration_ms(duration_ms)
            .usage(EventUsage {
                prompt_tokens: totals.total_prompt_tokens,
                completion_tokens: totals.total_completion_tokens,
                cost_cents: totals.total_cost_cents,
            })
            .data(json!({ "error": e.to_string() })),
        );
    }

    fn emit(&self, event: LogEvent) {
        self.agent.sink.emit(event);
    }
}
