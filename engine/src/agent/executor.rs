//! Round execution
//!
//! One execution round takes the actions proposed by a planning decision,
//! resolves their dependency order, and runs them in waves. Calls inside a
//! wave have no dependency on each other and run concurrently as tokio tasks;
//! a wave starts only once the previous one has settled and its patches were
//! merged. A failing or panicking action only affects its own audit entry.

use super::context::Context;
use super::transcript::Transcript;
use crate::actions::{Action, ActionRegistry};
use crate::events::{EventStatus, LogEvent, LogEventKind, LogSink};
use crate::llm::{new_tool_call_id, Message, ToolCall};
use crate::planner::PlanningDecision;
use crate::resolver::{execution_waves, resolve};
use futures::stream::{FuturesUnordered, StreamExt};
use sdk::{ActionContext, ActionOutput, ActionParams, AgentError, ExecutedAction};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// One action call scheduled for execution
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub tool_call_id: String,
    pub action: Arc<Action>,

    /// Parameters as proposed (not yet validated)
    pub parameters: Value,

    /// True when the resolver added the call as a dependency
    pub inserted: bool,
}

impl ScheduledCall {
    fn tool_call(&self) -> ToolCall {
        ToolCall::new(
            self.tool_call_id.clone(),
            self.action.id(),
            self.parameters.clone(),
        )
    }
}

/// The calls of one round, split into dependency waves
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Calls to execute, in resolved order
    pub calls: Vec<ScheduledCall>,

    /// Proposed calls filtered out because their action may not run again
    pub skipped: Vec<ToolCall>,

    /// Action ids grouped by dependency depth
    pub waves: Vec<Vec<String>>,
}

impl Schedule {
    /// Every declared tool call, scheduled first
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .map(ScheduledCall::tool_call)
            .chain(self.skipped.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.skipped.is_empty()
    }
}

/// Counts of one executed round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// How one call ended
enum CallResult {
    Success(ActionOutput),
    Failure(String),
}

/// Executes rounds for one interaction
pub struct RoundExecutor<'a> {
    pub registry: &'a ActionRegistry,
    pub sink: &'a dyn LogSink,
    pub session_id: &'a str,
    pub interaction_id: &'a str,
}

impl RoundExecutor<'_> {
    /// Resolve a decision into a schedule and declare it in the transcript.
    ///
    /// Appends the assistant message listing every tool call, then a
    /// `skipped` result for each call that will not run.
    ///
    /// # Errors
    /// `ActionNotFound` or `CircularDependency` from resolution; both end the
    /// interaction.
    pub fn schedule(
        &self,
        decision: &PlanningDecision,
        context: &Context,
        transcript: &mut Transcript,
    ) -> Result<Schedule, AgentError> {
        let requested = decision.action_ids();
        let order = resolve(&requested, self.registry, &context.succeeded_ids())?;
        let in_order: HashSet<&str> = order.iter().map(String::as_str).collect();

        let mut schedule = Schedule {
            waves: execution_waves(&order, self.registry),
            ..Default::default()
        };

        for id in &order {
            let action = self.registry.require(id)?;
            let proposals: Vec<&Value> = decision
                .next_actions
                .iter()
                .filter(|p| &p.action_id == id)
                .map(|p| &p.parameters)
                .collect();

            if proposals.is_empty() {
                debug!("Inserting dependency '{}' ahead of its dependents", id);
                schedule.calls.push(ScheduledCall {
                    tool_call_id: new_tool_call_id(),
                    action: Arc::clone(action),
                    parameters: Value::Object(Map::new()),
                    inserted: true,
                });
            } else {
                for (n, parameters) in proposals.into_iter().enumerate() {
                    if n > 0 && !action.allows_rerun() {
                        schedule.skipped.push(ToolCall::new(
                            new_tool_call_id(),
                            id.clone(),
                            parameters.clone(),
                        ));
                        continue;
                    }
                    schedule.calls.push(ScheduledCall {
                        tool_call_id: new_tool_call_id(),
                        action: Arc::clone(action),
                        parameters: parameters.clone(),
                        inserted: false,
                    });
                }
            }
        }

        for proposal in &decision.next_actions {
            if !in_order.contains(proposal.action_id.as_str()) {
                schedule.skipped.push(ToolCall::new(
                    new_tool_call_id(),
                    proposal.action_id.clone(),
                    proposal.parameters.clone(),
                ));
            }
        }

        transcript.push(Message::assistant_tool_calls(
            decision.response.text_response.clone(),
            decision.response.reasoning.clone(),
            schedule.tool_calls(),
        ));

        for call in &schedule.skipped {
            info!(
                "Skipping '{}': not allowed to run more than once per interaction",
                call.name
            );
            transcript.push(Message::tool_result(
                json!({
                    "status": "skipped",
                    "reason": "not allowed to run more than once per interaction",
                })
                .to_string(),
                call.id.clone(),
            ));
        }

        Ok(schedule)
    }

    /// Run a schedule wave by wave.
    ///
    /// Never fails: every call ends as a success or error audit entry plus a
    /// tool-result message, appended in settlement order.
    pub async fn execute(
        &self,
        schedule: Schedule,
        step: u32,
        context: &mut Context,
        transcript: &mut Transcript,
    ) -> RoundOutcome {
        let mut outcome = RoundOutcome {
            skipped: schedule.skipped.len(),
            ..Default::default()
        };
        let round_ids: HashSet<&str> = schedule
            .calls
            .iter()
            .map(|c| c.action.id())
            .collect();
        // Ids with a failed call this round; their in-round dependents do not run
        let mut failed_ids: HashSet<String> = HashSet::new();

        for (wave_index, wave) in schedule.waves.iter().enumerate() {
            let wave_ids: HashSet<&str> = wave.iter().map(String::as_str).collect();
            let calls: Vec<&ScheduledCall> = schedule
                .calls
                .iter()
                .filter(|c| wave_ids.contains(c.action.id()))
                .collect();

            debug!(
                "Round {} wave {}: {} calls",
                step,
                wave_index,
                calls.len()
            );

            let mut in_flight = FuturesUnordered::new();
            let mut writers: HashMap<String, String> = HashMap::new();

            for call in calls {
                let blocked = call
                    .action
                    .dependencies()
                    .iter()
                    .find(|dep| round_ids.contains(dep.as_str()) && failed_ids.contains(*dep));
                if let Some(dep) = blocked {
                    let message = format!("Skipped: dependency '{}' did not succeed", dep);
                    self.settle(
                        call,
                        call.parameters.clone(),
                        CallResult::Failure(message),
                        Duration::ZERO,
                        step,
                        context,
                        transcript,
                    );
                    outcome.failed += 1;
                    failed_ids.insert(call.action.id().to_string());
                    continue;
                }

                let parameters = match call.action.validate_parameters(&call.parameters) {
                    Ok(parameters) => parameters,
                    Err(e) => {
                        warn!("{}", e);
                        self.settle(
                            call,
                            call.parameters.clone(),
                            CallResult::Failure(e.to_string()),
                            Duration::ZERO,
                            step,
                            context,
                            transcript,
                        );
                        outcome.failed += 1;
                        failed_ids.insert(call.action.id().to_string());
                        continue;
                    }
                };

                let action_ctx = ActionContext {
                    input: context.input.clone(),
                    state: context.state.clone(),
                    session_id: self.session_id.to_string(),
                    interaction_id: self.interaction_id.to_string(),
                    tool_call_id: call.tool_call_id.clone(),
                };
                let action = Arc::clone(&call.action);
                let params = ActionParams::from_value(parameters.clone());

                debug!("Dispatching '{}' ({})", action.id(), call.tool_call_id);
                let handle = tokio::spawn(async move {
                    let started = Instant::now();
                    let result = action.run(action_ctx, params).await;
                    (result, started.elapsed())
                });

                in_flight.push(async move { (call, parameters, handle.await) });
            }

            while let Some((call, parameters, joined)) = in_flight.next().await {
                let (result, elapsed) = match joined {
                    Ok((Ok(output), elapsed)) => (CallResult::Success(output), elapsed),
                    Ok((Err(e), elapsed)) => (CallResult::Failure(e.to_string()), elapsed),
                    Err(e) => (CallResult::Failure(describe_join_error(e)), Duration::ZERO),
                };

                if let CallResult::Success(output) = &result {
                    for key in output.patch.keys() {
                        if let Some(previous) = writers.insert(key.clone(), call.action.id().to_string())
                        {
                            warn!(
                                "State key '{}' written by both '{}' and '{}' in the same wave; last write wins",
                                key,
                                previous,
                                call.action.id()
                            );
                        }
                    }
                }

                match &result {
                    CallResult::Success(_) => outcome.succeeded += 1,
                    CallResult::Failure(message) => {
                        warn!(
                            "{}",
                            AgentError::ActionExecution {
                                action_id: call.action.id().to_string(),
                                message: message.clone(),
                            }
                        );
                        outcome.failed += 1;
                        failed_ids.insert(call.action.id().to_string());
                    }
                }

                self.settle(call, parameters, result, elapsed, step, context, transcript);
            }
        }

        outcome
    }

    /// Record one settled call: state patch, audit entry, tool message, event
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        call: &ScheduledCall,
        parameters: Value,
        result: CallResult,
        elapsed: Duration,
        step: u32,
        context: &mut Context,
        transcript: &mut Transcript,
    ) {
        let action_id = call.action.id();
        let event = LogEvent::new(
            LogEventKind::ExecuteAction,
            self.session_id,
            self.interaction_id,
        )
        .step(step)
        .duration_ms(elapsed.as_millis() as u64);

        match result {
            CallResult::Success(output) => {
                context.apply_patch(&output.patch);
                transcript.push(Message::tool_result(
                    json!({"status": "success", "result": output.value}).to_string(),
                    call.tool_call_id.clone(),
                ));
                self.sink.emit(event.data(json!({
                    "actionId": action_id,
                    "toolCallId": call.tool_call_id,
                    "parameters": parameters,
                    "result": output.value,
                    "inserted": call.inserted,
                    "state": context.state,
                })));
                context.record(ExecutedAction::success(
                    action_id,
                    call.tool_call_id.clone(),
                    parameters,
                    output.value,
                ));
                debug!("'{}' succeeded in {:?}", action_id, elapsed);
            }
            CallResult::Failure(message) => {
                transcript.push(Message::tool_result(
                    json!({"status": "error", "error": message}).to_string(),
                    call.tool_call_id.clone(),
                ));
                self.sink.emit(event.status(EventStatus::Error).data(json!({
                    "actionId": action_id,
                    "toolCallId": call.tool_call_id,
                    "parameters": parameters,
                    "error": message,
                    "inserted": call.inserted,
                })));
                context.record(ExecutedAction::error(
                    action_id,
                    call.tool_call_id.clone(),
                    parameters,
                    message,
                ));
            }
        }
    }
}

/// Describe a task that did not finish normally
fn describe_join_error(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("Action task did not complete: {}", error);
    }

    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));
    match message {
        Some(message) => format!("Action panicked: {}", message),
        None => "Action panicked".to_string(),
    }
}
