//! Taskloop SDK
//!
//! Shared library providing the traits, types, and error taxonomy used by
//! action authors and by the task loop engine.

/// Action handler trait and context types
pub mod action;

/// Error types and handling
pub mod errors;

/// Parameter, state and audit types
pub mod types;

// Re-export commonly used types
pub use action::{ActionContext, ActionHandler, FnHandler};
pub use errors::{AgentError, AgentErrorExt};
pub use types::{
    ActionError, ActionOutput, ActionParams, ActionStatus, ExecutedAction, StateBag, StatePatch,
};
