//! Example running the task loop end to end without a network model
//!
//! A small offline adapter plays the model: it asks for `sum`, then `minus`,
//! then answers with the value found in state. Run with:
//!
//! ```text
//! RUST_LOG=debug cargo run --example calculator_agent
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use sdk::{ActionContext, ActionError, ActionOutput, ActionParams, StatePatch};
use serde_json::json;
use taskloop_engine::llm::{Completion, CompletionRequest, ModelAdapter, TokenUsage};
use taskloop_engine::telemetry::init_telemetry;
use taskloop_engine::{Action, Agent, AgentRequest, PricingTable, ResponseFormat};

/// Replays a fixed plan: one round per call
struct OfflineModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelAdapter for OfflineModel {
    fn model_id(&self) -> &str {
        "gpt-4o-mini"
    }

    async fn complete(&self, request: CompletionRequest) -> taskloop_engine::llm::Result<Completion> {
        let content = if request.schema_name != "planning_decision" {
            json!({"answer": 7, "explanation": "5 + 3 = 8, 8 - 1 = 7"})
        } else {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => json!({
                    "nextActions": [{"actionId": "sum", "parameters": {"a": 5, "b": 3}}],
                    "response": {"textResponse": "", "reasoning": "Add first"}
                }),
                1 => json!({
                    "nextActions": [{"actionId": "minus", "parameters": {"a": 8, "b": 1}}],
                    "response": {"textResponse": "", "reasoning": "Then subtract"}
                }),
                _ => json!({
                    "nextActions": [],
                    "response": {"textResponse": "5 plus 3 minus 1 is 7.", "reasoning": "Done"}
                }),
            }
        };
        Ok(Completion::new(content, TokenUsage::new(850, 120)))
    }
}

fn arithmetic(id: &str, description: &str, op: fn(f64, f64) -> f64) -> Action {
    Action::from_fn(id, description, move |_ctx: ActionContext, params: ActionParams| async move {
        let result = op(params.param_f64("a")?, params.param_f64("b")?);
        Ok::<_, ActionError>(
            ActionOutput::value(json!(result))
                .with_patch(StatePatch::new().set("lastResult", json!(result))),
        )
    })
    .with_parameters(json!({
        "type": "object",
        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
        "required": ["a", "b"]
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    let agent = Agent::builder(Arc::new(OfflineModel {
        calls: AtomicUsize::new(0),
    }))
    .instructions("You are a careful calculator. Use one action per arithmetic step.")
    .actions([
        arithmetic("sum", "Add two numbers", |a, b| a + b),
        arithmetic("minus", "Subtract b from a", |a, b| a - b),
    ])
    .pricing(PricingTable::default())
    .build()
    .context("Failed to build agent")?;

    let format = ResponseFormat::new(
        "calculation",
        json!({
            "type": "object",
            "properties": {
                "answer": {"type": "number"},
                "explanation": {"type": "string"}
            },
            "required": ["answer"]
        }),
    );

    let response = agent
        .run(AgentRequest::new("What is 5 plus 3 minus 1?").with_response_format(format))
        .await
        .context("Interaction failed")?;

    println!("Response: {}", response.response);
    println!(
        "Steps: {}, cost: {:.4} cents, tokens: {} in / {} out",
        response.steps,
        response.total_cost_cents,
        response.total_prompt_tokens,
        response.total_completion_tokens
    );
    for action in &response.context.executed_actions {
        println!("  {} {:?} -> {:?}", action.id, action.status, action.result);
    }

    Ok(())
}
