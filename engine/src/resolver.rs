//! Dependency resolution
//!
//! Turns the action ids proposed in a planning round into a dependency-closed
//! execution order. Depth-first post-order per requested id: dependencies are
//! inserted ahead of their dependents, a DFS stack detects cycles, and
//! independent requested ids keep the order the caller listed them in.

use crate::actions::ActionRegistry;
use sdk::AgentError;
use std::collections::{HashMap, HashSet};

/// Resolve an execution order for `requested`.
///
/// * Requested ids are kept unless they already ran in this interaction and
///   their action forbids reruns.
/// * Dependencies the caller did not request are inserted ahead of their
///   dependents, unless they already ran in this interaction.
/// * Dependencies are always walked, so a cycle is reported even when part
///   of it already ran.
///
/// The result contains each id at most once.
///
/// # Errors
/// * `ActionNotFound` - an id (requested or dependency) is not registered
/// * `CircularDependency` - the dependency graph reachable from `requested`
///   has a cycle; the error names the cycle, first node repeated at the end
pub fn resolve(
    requested: &[String],
    registry: &ActionRegistry,
    already_executed: &HashSet<String>,
) -> Result<Vec<String>, AgentError> {
    let mut walk = Walk {
        registry,
        already_executed,
        requested: requested.iter().map(String::as_str).collect(),
        visited: HashSet::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };

    for id in requested {
        walk.visit(id)?;
    }

    Ok(walk.order)
}

struct Walk<'a> {
    registry: &'a ActionRegistry,
    already_executed: &'a HashSet<String>,
    requested: HashSet<&'a str>,
    visited: HashSet<String>,
    stack: Vec<String>,
    order: Vec<String>,
}

impl Walk<'_> {
    fn visit(&mut self, id: &str) -> Result<(), AgentError> {
        if self.visited.contains(id) {
            return Ok(());
        }

        if let Some(pos) = self.stack.iter().position(|s| s == id) {
            let mut cycle = self.stack[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(AgentError::CircularDependency { cycle });
        }

        let registry = self.registry;
        let action = registry.require(id)?;

        self.stack.push(id.to_string());
        for dep in action.dependencies() {
            self.visit(dep)?;
        }
        self.stack.pop();
        self.visited.insert(id.to_string());

        let executed = self.already_executed.contains(id);
        let keep = if self.requested.contains(id) {
            !executed || action.allows_rerun()
        } else {
            !executed
        };
        if keep {
            self.order.push(id.to_string());
        }

        Ok(())
    }
}

/// Split a resolved order into waves.
///
/// An id lands one wave after the deepest of its dependencies present in
/// `order`; ids with no such dependency are in the first wave. Every wave can
/// run concurrently once the previous ones have settled.
///
/// `order` must be topologically sorted (as returned by `resolve`).
pub fn execution_waves(order: &[String], registry: &ActionRegistry) -> Vec<Vec<String>> {
    let mut depth: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    for id in order {
        let level = registry
            .get(id)
            .map(|action| {
                action
                    .dependencies()
                    .iter()
                    .filter_map(|dep| depth.get(dep.as_str()))
                    .map(|d| d + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        depth.insert(id.as_str(), level);
        if waves.len() <= level {
            waves.resize_with(level + 1, Vec::new);
        }
        waves[level].push(id.clone());
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use sdk::{ActionError, ActionOutput, ActionParams};

    fn noop(id: &str) -> Action {
        Action::from_fn(id, id, |_ctx, _params: ActionParams| async {
            Ok::<_, ActionError>(ActionOutput::empty())
        })
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn support_registry() -> ActionRegistry {
        ActionRegistry::new(vec![
            noop("getCustomerInfo"),
            noop("createTicket").depends_on(["getCustomerInfo"]),
            noop("notify").depends_on(["createTicket"]),
            noop("lookupWeather"),
        ])
        .unwrap()
    }

    #[test]
    fn test_dependency_inserted_first() {
        let registry = support_registry();
        let order = resolve(&ids(&["createTicket"]), &registry, &HashSet::new()).unwrap();
        assert_eq!(order, ids(&["getCustomerInfo", "createTicket"]));
    }

    #[test]
    fn test_transitive_chain() {
        let registry = support_registry();
        let order = resolve(&ids(&["notify"]), &registry, &HashSet::new()).unwrap();
        assert_eq!(order, ids(&["getCustomerInfo", "createTicket", "notify"]));
    }

    #[test]
    fn test_requested_order_preserved_for_independent_ids() {
        let registry = support_registry();
        let order = resolve(
            &ids(&["lookupWeather", "getCustomerInfo"]),
            &registry,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(order, ids(&["lookupWeather", "getCustomerInfo"]));
    }

    #[test]
    fn test_requested_dependency_listed_after_dependent_moves_first() {
        let registry = support_registry();
        let order = resolve(
            &ids(&["createTicket", "getCustomerInfo"]),
            &registry,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(order, ids(&["getCustomerInfo", "createTicket"]));
    }

    #[test]
    fn test_duplicates_collapsed() {
        let registry = support_registry();
        let order = resolve(
            &ids(&["createTicket", "createTicket", "getCustomerInfo"]),
            &registry,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(order, ids(&["getCustomerInfo", "createTicket"]));
    }

    #[test]
    fn test_executed_dependency_not_reinserted() {
        let registry = support_registry();
        let executed: HashSet<String> = ["getCustomerInfo".to_string()].into();
        let order = resolve(&ids(&["createTicket"]), &registry, &executed).unwrap();
        assert_eq!(order, ids(&["createTicket"]));
    }

    #[test]
    fn test_executed_requested_rerunnable_kept() {
        let registry = support_registry();
        let executed: HashSet<String> = ["lookupWeather".to_string()].into();
        let order = resolve(&ids(&["lookupWeather"]), &registry, &executed).unwrap();
        assert_eq!(order, ids(&["lookupWeather"]));
    }

    #[test]
    fn test_executed_requested_non_rerunnable_skipped() {
        let registry =
            ActionRegistry::new(vec![noop("charge").allow_rerun(false), noop("receipt")]).unwrap();
        let executed: HashSet<String> = ["charge".to_string()].into();
        let order = resolve(&ids(&["charge", "receipt"]), &registry, &executed).unwrap();
        assert_eq!(order, ids(&["receipt"]));
    }

    #[test]
    fn test_unknown_id() {
        let registry = support_registry();
        let err = resolve(&ids(&["ghost"]), &registry, &HashSet::new()).unwrap_err();
        assert!(matches!(err, AgentError::ActionNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_two_node_cycle() {
        let registry = ActionRegistry::new(vec![
            noop("A").depends_on(["B"]),
            noop("B").depends_on(["A"]),
        ])
        .unwrap();
        let err = resolve(&ids(&["A"]), &registry, &HashSet::new()).unwrap_err();
        match err {
            AgentError::CircularDependency { cycle } => assert_eq!(cycle, ids(&["A", "B", "A"])),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_cycle() {
        let registry = ActionRegistry::new(vec![noop("loop").depends_on(["loop"])]).unwrap();
        let err = resolve(&ids(&["loop"]), &registry, &HashSet::new()).unwrap_err();
        assert!(matches!(err, AgentError::CircularDependency { cycle } if cycle == ids(&["loop", "loop"])));
    }

    #[test]
    fn test_cycle_detected_through_executed_actions() {
        let registry = ActionRegistry::new(vec![
            noop("A").depends_on(["B"]),
            noop("B").depends_on(["A"]),
        ])
        .unwrap();
        let executed: HashSet<String> = ["A".to_string(), "B".to_string()].into();
        assert!(resolve(&ids(&["A"]), &registry, &executed).is_err());
    }

    #[test]
    fn test_execution_waves() {
        let registry = support_registry();
        let order = resolve(
            &ids(&["notify", "lookupWeather"]),
            &registry,
            &HashSet::new(),
        )
        .unwrap();
        let waves = execution_waves(&order, &registry);
        assert_eq!(
            waves,
            vec![
                ids(&["getCustomerInfo", "lookupWeather"]),
                ids(&["createTicket"]),
                ids(&["notify"]),
            ]
        );
    }

    #[test]
    fn test_waves_ignore_dependencies_outside_order() {
        let registry = support_registry();
        let executed: HashSet<String> = ["getCustomerInfo".to_string()].into();
        let order = resolve(&ids(&["createTicket"]), &registry, &executed).unwrap();
        assert_eq!(execution_waves(&order, &registry), vec![ids(&["createTicket"])]);
    }
}
