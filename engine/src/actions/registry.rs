//! Action registry
//!
//! Immutable, id-indexed collection of actions. Built once when the agent is
//! constructed; validation happens here so the loop can rely on every id and
//! every `dependsOn` edge being known.

use super::Action;
use sdk::AgentError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of available actions
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<Action>>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Build a registry.
    ///
    /// # Errors
    /// * `DuplicateAction` - two actions share an id
    /// * `InvalidParameterSchema` - a parameter schema does not compile
    /// * `ActionNotFound` - a `dependsOn` entry names an unregistered action
    pub fn new(actions: Vec<Action>) -> Result<Self, AgentError> {
        let mut registry = Self::default();

        for mut action in actions {
            if registry.index.contains_key(action.id()) {
                return Err(AgentError::DuplicateAction(action.id().to_string()));
            }
            action.compile()?;
            registry
                .index
                .insert(action.id().to_string(), registry.actions.len());
            registry.actions.push(Arc::new(action));
        }

        for action in &registry.actions {
            if let Some(missing) = action
                .dependencies()
                .iter()
                .find(|dep| !registry.index.contains_key(dep.as_str()))
            {
                return Err(AgentError::ActionNotFound(missing.clone()));
            }
        }

        debug!("Registered {} actions", registry.actions.len());
        Ok(registry)
    }

    /// Look up an action by id
    pub fn get(&self, id: &str) -> Option<&Arc<Action>> {
        self.index.get(id).map(|&i| &self.actions[i])
    }

    /// Look up an action, failing with `ActionNotFound`
    pub fn require(&self, id: &str) -> Result<&Arc<Action>, AgentError> {
        self.get(id)
            .ok_or_else(|| AgentError::ActionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Actions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// JSON catalog of every action, in registration order
    pub fn catalog(&self) -> Value {
        Value::Array(self.actions.iter().map(|a| a.catalog_entry()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::{ActionError, ActionOutput, ActionParams};
    use serde_json::json;

    fn noop(id: &str) -> Action {
        Action::from_fn(id, format!("{} action", id), |_ctx, _params: ActionParams| async {
            Ok::<_, ActionError>(ActionOutput::empty())
        })
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = ActionRegistry::new(vec![noop("b"), noop("a")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["b", "a"]);
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert!(matches!(
            registry.require("missing"),
            Err(AgentError::ActionNotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = ActionRegistry::new(vec![noop("a"), noop("a")]).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateAction(id) if id == "a"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = ActionRegistry::new(vec![noop("a").depends_on(["ghost"])]).unwrap_err();
        assert!(matches!(err, AgentError::ActionNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_dependency_declared_later_is_accepted() {
        let registry =
            ActionRegistry::new(vec![noop("createTicket").depends_on(["getCustomerInfo"]), noop("getCustomerInfo")]);
        assert!(registry.is_ok());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let err = ActionRegistry::new(vec![noop("a").with_parameters(json!({"type": 7}))])
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameterSchema { .. }));
    }

    #[test]
    fn test_catalog() {
        let registry = ActionRegistry::new(vec![noop("a"), noop("b").depends_on(["a"])]).unwrap();
        let catalog = registry.catalog();
        assert_eq!(catalog.as_array().map(Vec::len), Some(2));
        assert_eq!(catalog[1]["dependsOn"], json!(["a"]));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ActionRegistry::new(vec![]).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.catalog(), json!([]));
    }
}
