//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sdk::{ActionContext, ActionError, ActionOutput, ActionParams, StatePatch};
use serde_json::{json, Value};
use taskloop_engine::costs::{ModelPricing, PricingTable};
use taskloop_engine::llm::{Completion, CompletionRequest, ModelAdapter, ModelError, TokenUsage};
use taskloop_engine::{Action, Agent, AgentBuilder, MemorySink};

/// Usage reported by every scripted call
pub const CALL_USAGE: TokenUsage = TokenUsage {
    input_tokens: 1_000,
    output_tokens: 500,
};

/// Model adapter replaying pre-baked responses.
///
/// Responses are returned in order; once the script runs out, the repeat
/// response (if any) is returned forever, otherwise calls fail.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Value, ModelError>>>,
    repeat: Option<Value>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Value>) -> Arc<Self> {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<Value, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A model that answers every call with `response`
    pub fn repeating(response: Value) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// System prompt of the n-th call
    pub fn prompt(&self, n: usize) -> String {
        self.requests.lock().unwrap()[n].messages[0].content.clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> taskloop_engine::llm::Result<Completion> {
        self.requests.lock().unwrap().push(request);

        let next = self.script.lock().unwrap().pop_front();
        let content = match (next, &self.repeat) {
            (Some(result), _) => result?,
            (None, Some(repeat)) => repeat.clone(),
            (None, None) => {
                return Err(ModelError::Unknown("script exhausted".to_string()));
            }
        };
        Ok(Completion::new(content, CALL_USAGE))
    }
}

/// Decision running the given actions
pub fn decide(actions: &[(&str, Value)]) -> Value {
    let next: Vec<Value> = actions
        .iter()
        .map(|(id, parameters)| json!({"actionId": id, "parameters": parameters}))
        .collect();
    json!({
        "nextActions": next,
        "response": {"textResponse": "", "reasoning": "working on it", "parametersReasoning": ""}
    })
}

/// Decision ending the loop
pub fn finish(text: &str) -> Value {
    json!({
        "nextActions": [],
        "response": {"textResponse": text, "reasoning": "done", "parametersReasoning": ""}
    })
}

/// $10 per million input tokens, $20 per million output tokens.
/// Each scripted call therefore costs 2 cents.
pub fn flat_pricing() -> PricingTable {
    PricingTable::flat(ModelPricing::new(10.0, 20.0))
}

pub const CENTS_PER_CALL: f64 = 2.0;

fn arithmetic(
    id: &str,
    description: &str,
    op: fn(f64, f64) -> f64,
) -> Action {
    Action::from_fn(id, description, move |_ctx: ActionContext, params: ActionParams| async move {
        let a = params.param_f64("a")?;
        let b = params.param_f64("b")?;
        let result = op(a, b);
        Ok::<_, ActionError>(
            ActionOutput::value(json!(result))
                .with_patch(StatePatch::new().set("result", json!(result))),
        )
    })
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "a": {"type": "number"},
            "b": {"type": "number"}
        },
        "required": ["a", "b"]
    }))
}

/// `sum(a, b)` and `minus(a, b)`
pub fn calculator_actions() -> Vec<Action> {
    vec![
        arithmetic("sum", "Add two numbers", |a, b| a + b),
        arithmetic("minus", "Subtract b from a", |a, b| a - b),
    ]
}

/// `getCustomerInfo` and `createTicket`, which depends on it
pub fn ticket_actions() -> Vec<Action> {
    vec![
        Action::from_fn(
            "getCustomerInfo",
            "Load the current customer",
            |_ctx: ActionContext, _params: ActionParams| async {
                Ok::<_, ActionError>(
                    ActionOutput::value(json!({"id": 42, "name": "Ada"}))
                        .with_patch(StatePatch::new().set("customerId", json!(42))),
                )
            },
        ),
        Action::from_fn(
            "createTicket",
            "Open a support ticket for the current customer",
            |ctx: ActionContext, params: ActionParams| async move {
                let customer = ctx
                    .get("customerId")
                    .cloned()
                    .ok_or_else(|| ActionError::failed("customer not loaded"))?;
                let subject = params.param_str_opt("subject").unwrap_or_default();
                Ok::<_, ActionError>(ActionOutput::value(
                    json!({"ticketId": "T-1", "customerId": customer, "subject": subject}),
                ))
            },
        )
        .depends_on(["getCustomerInfo"]),
    ]
}

pub fn builder(model: &Arc<ScriptedModel>, sink: &Arc<MemorySink>) -> AgentBuilder {
    Agent::builder(Arc::clone(model) as Arc<dyn ModelAdapter>)
        .instructions("Solve the user's request with the available actions.")
        .pricing(flat_pricing())
        .sink(Arc::clone(sink) as Arc<dyn taskloop_engine::LogSink>)
}
