//! Action handler trait and execution context
//!
//! This module defines the `ActionHandler` trait that every action body
//! implements, and the `ActionContext` snapshot it receives. A handler is a
//! reducer: it reads the snapshot and its parameters and returns a value plus
//! a `StatePatch`. The loop owns the shared state and applies the patch.

use crate::types::{ActionError, ActionOutput, ActionParams, StateBag};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

/// Read-only view of the interaction handed to an action
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Original user input of the interaction
    pub input: String,

    /// Snapshot of the shared state taken when the action was dispatched
    pub state: StateBag,

    /// Session the interaction belongs to
    pub session_id: String,

    /// Interaction being executed
    pub interaction_id: String,

    /// Correlation id of the tool call
    pub tool_call_id: String,
}

impl ActionContext {
    /// Look up a state value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Look up a numeric state value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.state.get(key).and_then(|v| v.as_f64())
    }

    /// Look up a string state value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(|v| v.as_str())
    }
}

/// Trait that all action bodies must implement
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action
    async fn execute(
        &self,
        ctx: ActionContext,
        params: ActionParams,
    ) -> Result<ActionOutput, ActionError>;
}

/// Adapter turning an async closure into an `ActionHandler`
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(ActionContext, ActionParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutput, ActionError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F, Fut>
where
    F: Fn(ActionContext, ActionParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutput, ActionError>> + Send,
{
    async fn execute(
        &self,
        ctx: ActionContext,
        params: ActionParams,
    ) -> Result<ActionOutput, ActionError> {
        (self.f)(ctx, params).await
    }
}
