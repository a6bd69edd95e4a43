//! Prompt construction
//!
//! Prompts are assembled from typed fields. Every caller- or model-provided
//! value (input, state, action results) is embedded JSON-encoded, so state
//! holding untrusted text cannot break out of its section.

use sdk::{ExecutedAction, StateBag};
use serde::Serialize;
use serde_json::Value;

/// State keys with this prefix are bookkeeping and never shown to the model
pub const INTERNAL_KEY_PREFIX: &str = "__";

const PLANNING_RULES: &[&str] = &[
    "Choose the actions needed next to accomplish the request. Actions listed together run concurrently unless one depends on another.",
    "Dependencies declared in dependsOn run automatically before the actions that need them.",
    "Parameters must match the action's parameters schema.",
    "Do not retry an action recorded with status \"error\" unless you have a new justification, such as different parameters or new information.",
    "When the request is fulfilled, return an empty nextActions list and put the final answer in response.textResponse.",
];

const RERUN_RULES: &[&str] = &[
    "This is a rerun of an earlier interaction. previousInteractionsActions lists what that run did and is read-only history.",
    "Decide which of those actions must run again under the current instructions and which results can be reused from state.",
    "executedActions lists only the actions run during this rerun.",
];

/// Render a value as JSON for embedding in a prompt
fn encode<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// State as shown to the model
pub fn visible_state(state: &StateBag) -> StateBag {
    state
        .iter()
        .filter(|(key, _)| !key.starts_with(INTERNAL_KEY_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// System message opening every transcript
pub fn system_message(instructions: &str, catalog: &Value) -> String {
    format!(
        "{}\n\n## Available actions\n{}",
        instructions.trim(),
        encode(catalog)
    )
}

/// Prompt for one planning round
#[derive(Debug, Clone)]
pub struct PlanningPrompt<'a> {
    pub instructions: &'a str,
    pub input: &'a str,
    pub catalog: &'a Value,
    pub state: &'a StateBag,
    pub executed_actions: &'a [ExecutedAction],

    /// Set for rerun interactions
    pub previous_interactions_actions: Option<&'a [ExecutedAction]>,

    /// Execution rounds already completed
    pub step: u32,
    pub max_steps: u32,
}

impl PlanningPrompt<'_> {
    pub fn is_rerun(&self) -> bool {
        self.previous_interactions_actions.is_some()
    }

    pub fn render(&self) -> String {
        let mut sections = vec![
            self.instructions.trim().to_string(),
            section("Available actions", &encode(self.catalog)),
            section("User input", &encode(self.input)),
            section("Current state", &encode(&visible_state(self.state))),
        ];

        if let Some(previous) = self.previous_interactions_actions {
            sections.push(section("previousInteractionsActions", &encode(previous)));
        }
        sections.push(section("executedActions", &encode(self.executed_actions)));

        sections.push(section(
            "Progress",
            &format!(
                "{} of {} execution rounds used.",
                self.step, self.max_steps
            ),
        ));

        let mut rules: Vec<&str> = PLANNING_RULES.to_vec();
        if self.is_rerun() {
            rules.extend_from_slice(RERUN_RULES);
        }
        sections.push(section("Rules", &bullet_list(&rules)));

        sections.push(section(
            "Response format",
            "Respond with a JSON object: {\"nextActions\": [{\"actionId\": string, \"parameters\": object}], \"response\": {\"textResponse\": string, \"reasoning\": string, \"parametersReasoning\": string}}",
        ));

        sections.join("\n\n")
    }
}

/// Prompt for the structured final response
#[derive(Debug, Clone)]
pub struct FormatPrompt<'a> {
    pub input: &'a str,
    pub draft: &'a str,
    pub state: &'a StateBag,
    pub executed_actions: &'a [ExecutedAction],
    pub schema: &'a Value,
}

impl FormatPrompt<'_> {
    pub fn render(&self) -> String {
        [
            "Produce the final answer to the user's request as a JSON object matching the schema below. Use only facts present in the state, the executed actions and the draft answer.".to_string(),
            section("User input", &encode(self.input)),
            section("Draft answer", &encode(self.draft)),
            section("Current state", &encode(&visible_state(self.state))),
            section("executedActions", &encode(self.executed_actions)),
            section("Schema", &encode(self.schema)),
        ]
        .join("\n\n")
    }
}

fn section(title: &str, body: &str) -> String {
    format!("## {}\n{}", title, body)
}

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
