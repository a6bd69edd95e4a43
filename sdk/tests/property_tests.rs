use proptest::prelude::*;
use sdk::errors::{AgentError, AgentErrorExt};
use sdk::types::{StateBag, StatePatch};
use serde_json::json;

// Every error variant carries a static, non-empty hint that never echoes the
// raw payload back to the user.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(payload in "[a-zA-Z0-9_]{12,40}") {
        let errs = vec![
            AgentError::ActionNotFound(payload.clone()),
            AgentError::DuplicateAction(payload.clone()),
            AgentError::InvalidParameterSchema { action_id: payload.clone(), message: payload.clone() },
            AgentError::CircularDependency { cycle: vec![payload.clone(), payload.clone()] },
            AgentError::ActionParameterValidation { action_id: payload.clone(), message: payload.clone() },
            AgentError::ActionExecution { action_id: payload.clone(), message: payload.clone() },
            AgentError::Planning(payload.clone()),
            AgentError::TelemetryDelivery(payload.clone()),
            AgentError::Config(payload.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&payload));
        }
    }
}

// Applying a patch leaves exactly the touched keys changed.
proptest! {
    #[test]
    fn test_patch_only_touches_declared_keys(
        initial in prop::collection::btree_map("[a-e]", 0..100i64, 0..5),
        sets in prop::collection::btree_map("[c-h]", 0..100i64, 0..5),
        removes in prop::collection::btree_set("[a-h]", 0..3),
    ) {
        let mut state: StateBag = initial.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let before = state.clone();

        let mut patch = StatePatch::new();
        for (k, v) in &sets {
            patch = patch.set(k.clone(), json!(v));
        }
        for k in &removes {
            patch = patch.remove(k.clone());
        }
        patch.apply(&mut state);

        for (key, value) in &before {
            if !patch.keys().any(|k| k == key) {
                prop_assert_eq!(state.get(key), Some(value));
            }
        }
        for key in &removes {
            prop_assert!(!state.contains_key(key));
        }
        for (key, value) in &patch.set {
            prop_assert_eq!(state.get(key), Some(value));
        }
    }
}
