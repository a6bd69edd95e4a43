//! Interaction context
//!
//! The caller-visible record of one interaction: original input, the shared
//! state bag, and the audit trail of executed actions. The loop is the only
//! writer; actions see snapshots and return patches.

use sdk::{ExecutedAction, StateBag, StatePatch};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// State of one interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Original user input
    pub input: String,

    /// Shared state mutated through action patches
    #[serde(default)]
    pub state: StateBag,

    /// Actions run in this interaction, in settlement order. Append-only.
    #[serde(default)]
    pub executed_actions: Vec<ExecutedAction>,

    /// Actions of the interaction this one reruns. Read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_interactions_actions: Option<Vec<ExecutedAction>>,
}

impl Context {
    /// Fresh context for a new interaction
    pub fn new(input: impl Into<String>, state: StateBag) -> Self {
        Self {
            input: input.into(),
            state,
            executed_actions: Vec::new(),
            previous_interactions_actions: None,
        }
    }

    /// Context for a rerun of `prior`.
    ///
    /// Keeps the prior state, starts an empty audit trail and keeps the prior
    /// trail as read-only history.
    pub fn for_rerun(input: impl Into<String>, prior: Context) -> Self {
        Self {
            input: input.into(),
            state: prior.state,
            executed_actions: Vec::new(),
            previous_interactions_actions: Some(prior.executed_actions),
        }
    }

    pub fn is_rerun(&self) -> bool {
        self.previous_interactions_actions.is_some()
    }

    /// Append an audit record
    pub fn record(&mut self, action: ExecutedAction) {
        self.executed_actions.push(action);
    }

    /// Merge an action's state patch
    pub fn apply_patch(&mut self, patch: &StatePatch) {
        patch.apply(&mut self.state);
    }

    /// Ids of actions that succeeded at least once in this interaction
    pub fn succeeded_ids(&self) -> HashSet<String> {
        self.executed_actions
            .iter()
            .filter(|a| a.is_success())
            .map(|a| a.id.clone())
            .collect()
    }
}
