//! Taskloop Engine Library
//!
//! Planning/execution task loop for LLM-driven agents. A model plans the
//! next actions, the engine runs them (concurrently where their dependencies
//! allow), folds their results into shared state, and repeats until the
//! model is done or the step budget runs out.

/// Declared actions and the immutable registry
pub mod actions;

/// Agent surface and the task loop state machine
pub mod agent;

/// Configuration management module
pub mod config;

/// Model pricing and per-interaction cost totals
pub mod costs;

/// Structured event sinks
pub mod events;

/// Model adapter interface and transcript types
pub mod llm;

/// Planning prompts, decisions and the planner
pub mod planner;

/// Dependency resolution
pub mod resolver;

/// Compiled JSON schemas
pub mod schema;

/// Telemetry and Observability
pub mod telemetry;

pub use actions::{Action, ActionRegistry};
pub use agent::{
    Agent, AgentBuilder, AgentRequest, AgentResponse, Context, FinalResponse, RerunRequest,
    ResponseFormat,
};
pub use config::Config;
pub use costs::{CostAccountant, ModelPricing, PricingTable};
pub use events::{LogEvent, LogEventKind, LogSink, MemorySink, NullSink, TracingSink};
pub use llm::{Completion, CompletionRequest, Message, ModelAdapter, ModelError, TokenUsage};
