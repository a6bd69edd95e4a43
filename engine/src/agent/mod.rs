//! Agent
//!
//! The caller-facing surface of the task loop. An `Agent` owns an immutable
//! action registry, a planner bound to one model adapter, the pricing table
//! and a log sink. Each call to [`Agent::run`] or [`Agent::rerun`] is an
//! independent interaction with its own transcript, context and cost totals.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use taskloop_engine::agent::{Agent, AgentRequest};
//! # use taskloop_engine::llm::ModelAdapter;
//! # async fn demo(model: Arc<dyn ModelAdapter>) -> Result<(), sdk::AgentError> {
//! let agent = Agent::builder(model)
//!     .instructions("Answer arithmetic questions.")
//!     .max_steps(5)
//!     .build()?;
//!
//! let first = agent.run(AgentRequest::new("What is 5 plus 3?")).await?;
//! let again = agent.rerun(first.rerun_request("Now subtract 1")).await?;
//! println!("{}", again.response);
//! # Ok(())
//! # }
//! ```

pub mod context;
mod core;
pub mod executor;
pub mod transcript;

pub use context::Context;
pub use executor::{RoundOutcome, Schedule, ScheduledCall};
pub use transcript::Transcript;

pub use crate::planner::ResponseFormat;

use crate::actions::{Action, ActionRegistry};
use crate::config::{AgentConfig, Config};
use crate::costs::PricingTable;
use crate::events::{sink_from_config, LogSink, TracingSink};
use crate::llm::{Message, ModelAdapter};
use crate::planner::Planner;
use self::core::{run_interaction, InteractionRequest};
use sdk::{AgentError, StateBag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Input of a new interaction
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    /// Natural-language goal
    pub input: String,

    /// Initial state
    pub state: StateBag,

    /// Session to continue; a new one is created when absent
    pub session_id: Option<String>,

    /// Prior conversation, placed between the system message and the input
    pub messages: Vec<Message>,

    /// Schema the final response must follow
    pub response_format: Option<ResponseFormat>,
}

impl AgentRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: StateBag) -> Self {
        self.state = state;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Input of a rerun interaction
#[derive(Debug, Clone)]
pub struct RerunRequest {
    /// Input of the rerun; usually revised instructions for the same goal
    pub input: String,

    /// Final context of the interaction being rerun
    pub previous: Context,

    /// Session of the interaction being rerun
    pub session_id: String,

    pub messages: Vec<Message>,
    pub response_format: Option<ResponseFormat>,
}

impl RerunRequest {
    pub fn new(input: impl Into<String>, previous: Context, session_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            previous,
            session_id: session_id.into(),
            messages: Vec::new(),
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Final answer of an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalResponse {
    Text(String),
    Structured(Value),
}

impl FinalResponse {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}

impl fmt::Display for FinalResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// Result of a completed interaction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub response: FinalResponse,
    pub session_id: String,
    pub interaction_id: String,
    pub total_duration_ms: u64,
    pub total_cost_cents: f64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,

    /// Final input, state and audit trail; `state()` borrows the state
    pub context: Context,

    /// Full transcript, system message first
    pub messages: Vec<Message>,

    /// True when the step budget ran out before the model finished
    pub truncated: bool,

    /// Execution rounds completed
    pub steps: u32,
}

impl AgentResponse {
    /// State at the end of the interaction
    pub fn state(&self) -> &StateBag {
        &self.context.state
    }

    /// Rerun request continuing this interaction's session and state
    pub fn rerun_request(&self, input: impl Into<String>) -> RerunRequest {
        RerunRequest::new(input, self.context.clone(), self.session_id.clone())
    }
}

/// Task-loop agent
pub struct Agent {
    registry: ActionRegistry,
    planner: Planner,
    pricing: Arc<PricingTable>,
    sink: Arc<dyn LogSink>,
    instructions: String,
    catalog: Value,
    max_steps: u32,
}

impl Agent {
    pub fn builder(model: Arc<dyn ModelAdapter>) -> AgentBuilder {
        AgentBuilder::new(model)
    }

    /// Build an agent from the loaded configuration.
    ///
    /// Uses the `[agent]` settings, the `[pricing]` table and the sink
    /// described by `[telemetry]`. Must be called inside a tokio runtime
    /// when a telemetry endpoint is configured.
    pub fn from_config(
        model: Arc<dyn ModelAdapter>,
        actions: Vec<Action>,
        config: &Config,
    ) -> Result<Self, AgentError> {
        Self::builder(model)
            .actions(actions)
            .config(config.agent.clone())
            .pricing(config.pricing.clone())
            .sink(sink_from_config(&config.telemetry)?)
            .build()
    }

    /// Run a new interaction
    pub async fn run(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        let AgentRequest {
            input,
            state,
            session_id,
            messages,
            response_format,
        } = request;

        run_interaction(
            self,
            InteractionRequest {
                session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                context: Context::new(input, state),
                messages,
                response_format,
            },
        )
        .await
    }

    /// Rerun a previous interaction.
    ///
    /// Starts from the previous final state with an empty audit trail; the
    /// previous trail is shown to the planner as read-only history.
    pub async fn rerun(&self, request: RerunRequest) -> Result<AgentResponse, AgentError> {
        let RerunRequest {
            input,
            previous,
            session_id,
            messages,
            response_format,
        } = request;

        run_interaction(
            self,
            InteractionRequest {
                session_id,
                context: Context::for_rerun(input, previous),
                messages,
                response_format,
            },
        )
        .await
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn model_id(&self) -> &str {
        self.planner.model_id()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.planner.model_id())
            .field("actions", &self.registry.ids())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    model: Arc<dyn ModelAdapter>,
    actions: Vec<Action>,
    config: AgentConfig,
    pricing: PricingTable,
    sink: Option<Arc<dyn LogSink>>,
}

impl AgentBuilder {
    pub fn new(model: Arc<dyn ModelAdapter>) -> Self {
        Self {
            model,
            actions: Vec::new(),
            config: AgentConfig::default(),
            pricing: PricingTable::default(),
            sink: None,
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Replace all loop settings
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = instructions.into();
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Event sink; defaults to [`TracingSink`]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the settings and register the actions
    pub fn build(self) -> Result<Agent, AgentError> {
        if self.config.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be at least 1".to_string()));
        }

        let registry = ActionRegistry::new(self.actions)?;
        let catalog = registry.catalog();
        let planner = Planner::new(self.model)?
            .with_sampling(self.config.temperature, self.config.max_tokens);

        Ok(Agent {
            registry,
            planner,
            pricing: Arc::new(self.pricing),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            instructions: self.config.instructions,
            catalog,
            max_steps: self.config.max_steps,
        })
    }
}
