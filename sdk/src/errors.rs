//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the task loop.
//! All errors implement the `AgentErrorExt` trait which provides user-friendly
//! hints and indicates whether the loop can absorb them.
//!
//! # Propagation
//!
//! Action-level errors (`ActionParameterValidation`, `ActionExecution`) are
//! absorbed by the loop and turned into audit entries the model can reason
//! about. Planning-level errors (`Planning`, `ActionNotFound`,
//! `CircularDependency`) terminate the interaction and reach the caller.
//! `TelemetryDelivery` never leaves the logging sink.

use thiserror::Error;

/// Trait for agent error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information.
pub trait AgentErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is a static string: it never echoes model output, parameters
    /// or state contents back to the user.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are absorbed into model-visible state and the loop
    /// continues. Non-recoverable errors abort the interaction.
    fn is_recoverable(&self) -> bool;
}

/// Main agent error type
///
/// # Error Categories
///
/// - **Registry**: unknown, duplicate or badly declared actions
/// - **Resolution**: dependency cycles
/// - **Action**: parameter validation and execution failures
/// - **Planning**: model adapter failures and invalid decisions
/// - **Telemetry**: logging sink delivery failures
/// - **Configuration**: invalid or unreadable configuration
///
/// # Examples
///
/// ```
/// use sdk::errors::{AgentError, AgentErrorExt};
///
/// let error = AgentError::ActionExecution {
///     action_id: "sum".to_string(),
///     message: "overflow".to_string(),
/// };
/// assert!(error.is_recoverable());
///
/// let fatal = AgentError::CircularDependency {
///     cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
/// };
/// assert!(!fatal.is_recoverable());
/// assert_eq!(fatal.to_string(), "Circular dependency detected: a -> b -> a");
/// ```
#[derive(Debug, Error)]
pub enum AgentError {
    // Registry errors
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Duplicate action id: {0}")]
    DuplicateAction(String),

    #[error("Invalid parameter schema for action '{action_id}': {message}")]
    InvalidParameterSchema { action_id: String, message: String },

    // Resolution errors
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    // Action errors
    #[error("Invalid parameters for action '{action_id}': {message}")]
    ActionParameterValidation { action_id: String, message: String },

    #[error("Action '{action_id}' failed: {message}")]
    ActionExecution { action_id: String, message: String },

    // Planning errors
    #[error("Planning failed: {0}")]
    Planning(String),

    // Telemetry errors
    #[error("Telemetry delivery failed: {0}")]
    TelemetryDelivery(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentErrorExt for AgentError {
    fn user_hint(&self) -> &str {
        match self {
            // Registry errors
            Self::ActionNotFound(_) => "The model asked for an action that is not registered",
            Self::DuplicateAction(_) => "Each action must be registered under a unique id",
            Self::InvalidParameterSchema { .. } => {
                "An action declares a parameter schema that is not valid JSON Schema"
            }

            // Resolution errors
            Self::CircularDependency { .. } => {
                "Action dependencies form a cycle. Fix the dependsOn declarations"
            }

            // Action errors
            Self::ActionParameterValidation { .. } => {
                "The model proposed parameters that do not match the action schema"
            }
            Self::ActionExecution { .. } => "An action failed while running",

            // Planning errors
            Self::Planning(_) => "The language model call failed. Try the request again",

            // Telemetry errors
            Self::TelemetryDelivery(_) => "Event delivery to the logging endpoint failed",

            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Absorbed by the loop and reported back to the model
            Self::ActionParameterValidation { .. }
            | Self::ActionExecution { .. }
            | Self::TelemetryDelivery(_) => true,

            // Everything else ends the interaction
            _ => false,
        }
    }
}
