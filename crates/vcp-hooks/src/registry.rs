//! Hook registry with deployment and session scopes
//!
//! Deployment hooks execute before session hooks at the same priority
//! level. Registration keeps each per-type list sorted by priority
//! descending so chain assembly is a single merge pass.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::types::{Hook, HookError, HookType};

/// Registration scope for a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookScope {
    /// Process-wide; applies to every session
    Deployment,
    /// Scoped to one session id
    Session(String),
}

impl HookScope {
    fn describe(&self) -> String {
        match self {
            Self::Deployment => "deployment".to_string(),
            Self::Session(id) => format!("session={id}"),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    deployment: HashMap<HookType, Vec<Hook>>,
    sessions: HashMap<String, HashMap<HookType, Vec<Hook>>>,
}

/// Central hook registry.
///
/// All operations are safe under concurrent callers; chain reads take a
/// snapshot under the lock and merge outside it.
#[derive(Default)]
pub struct HookRegistry {
    state: Mutex<RegistryState>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook in the given scope.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Validation`] for an invalid definition and
    /// [`HookError::Duplicate`] when the name already exists in the
    /// scope for the hook's type.
    pub fn register(&self, hook: Hook, scope: HookScope) -> Result<(), HookError> {
        hook.validate()?;

        let mut state = self.state.lock();
        let target = match &scope {
            HookScope::Deployment => state.deployment.entry(hook.hook_type).or_default(),
            HookScope::Session(id) => state
                .sessions
                .entry(id.clone())
                .or_default()
                .entry(hook.hook_type)
                .or_default(),
        };

        if target.iter().any(|h| h.name == hook.name) {
            return Err(HookError::Duplicate {
                name: hook.name.clone(),
                scope: scope.describe(),
            });
        }

        info!(
            name = %hook.name,
            hook_type = hook.hook_type.as_str(),
            scope = %scope.describe(),
            priority = hook.priority,
            "hook registered"
        );
        target.push(hook);
        target.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(())
    }

    /// Remove a hook by name from every type list in the scope.
    ///
    /// Returns true if at least one hook was removed.
    pub fn deregister(&self, name: &str, scope: &HookScope) -> bool {
        let mut state = self.state.lock();
        let found = match scope {
            HookScope::Deployment => {
                Self::remove_named(&mut state.deployment, name)
            }
            HookScope::Session(id) => state
                .sessions
                .get_mut(id)
                .map(|hooks| Self::remove_named(hooks, name))
                .unwrap_or(false),
        };

        if found {
            info!(name, scope = %scope.describe(), "hook deregistered");
        }
        found
    }

    fn remove_named(hooks: &mut HashMap<HookType, Vec<Hook>>, name: &str) -> bool {
        let mut found = false;
        for list in hooks.values_mut() {
            let before = list.len();
            list.retain(|h| h.name != name);
            found |= list.len() < before;
        }
        found
    }

    /// Return the merged, priority-descending chain for a type and
    /// session. Deployment hooks precede session hooks at equal priority.
    pub fn chain(&self, hook_type: HookType, session_id: &str) -> Vec<Hook> {
        let (deployment, session) = {
            let state = self.state.lock();
            (
                state.deployment.get(&hook_type).cloned().unwrap_or_default(),
                state
                    .sessions
                    .get(session_id)
                    .and_then(|hooks| hooks.get(&hook_type))
                    .cloned()
                    .unwrap_or_default(),
            )
        };
        merge_by_priority(deployment, session)
    }

    /// Total registered hooks in a scope.
    pub fn registered_count(&self, scope: &HookScope) -> usize {
        let state = self.state.lock();
        match scope {
            HookScope::Deployment => state.deployment.values().map(Vec::len).sum(),
            HookScope::Session(id) => state
                .sessions
                .get(id)
                .map(|hooks| hooks.values().map(Vec::len).sum())
                .unwrap_or(0),
        }
    }

    /// Drop all hooks for a session.
    pub fn clear_session(&self, session_id: &str) {
        self.state.lock().sessions.remove(session_id);
        debug!(session_id, "session hooks cleared");
    }
}

/// Merge two priority-descending lists, deployment first at equal
/// priority.
fn merge_by_priority(deployment: Vec<Hook>, session: Vec<Hook>) -> Vec<Hook> {
    let mut result = Vec::with_capacity(deployment.len() + session.len());
    let mut d = deployment.into_iter().peekable();
    let mut s = session.into_iter().peekable();

    loop {
        match (d.peek(), s.peek()) {
            (Some(dh), Some(sh)) => {
                if dh.priority >= sh.priority {
                    result.extend(d.next());
                } else {
                    result.extend(s.next());
                }
            }
            (Some(_), None) => result.extend(d.next()),
            (None, Some(_)) => result.extend(s.next()),
            (None, None) => break,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HookAction, HookResult};
    use std::sync::Arc;

    fn hook(name: &str, hook_type: HookType, priority: u8) -> Hook {
        let action: HookAction = Arc::new(|_| HookResult::Continue);
        Hook::new(name, hook_type, priority, action)
    }

    #[test]
    fn duplicate_names_rejected_within_scope() {
        let registry = HookRegistry::new();
        registry
            .register(hook("a", HookType::PreInject, 50), HookScope::Deployment)
            .unwrap();
        let err = registry
            .register(hook("a", HookType::PreInject, 60), HookScope::Deployment)
            .unwrap_err();
        assert!(matches!(err, HookError::Duplicate { .. }));

        // Same name in a session scope is fine
        registry
            .register(
                hook("a", HookType::PreInject, 60),
                HookScope::Session("s1".into()),
            )
            .unwrap();
    }

    #[test]
    fn chain_is_priority_descending_deployment_first() {
        let registry = HookRegistry::new();
        registry
            .register(hook("d-50", HookType::PreInject, 50), HookScope::Deployment)
            .unwrap();
        registry
            .register(hook("d-90", HookType::PreInject, 90), HookScope::Deployment)
            .unwrap();
        registry
            .register(
                hook("s-90", HookType::PreInject, 90),
                HookScope::Session("s1".into()),
            )
            .unwrap();
        registry
            .register(
                hook("s-70", HookType::PreInject, 70),
                HookScope::Session("s1".into()),
            )
            .unwrap();

        let names: Vec<String> = registry
            .chain(HookType::PreInject, "s1")
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, ["d-90", "s-90", "s-70", "d-50"]);
    }

    #[test]
    fn chain_for_other_session_excludes_session_hooks() {
        let registry = HookRegistry::new();
        registry
            .register(
                hook("mine", HookType::OnTransition, 50),
                HookScope::Session("s1".into()),
            )
            .unwrap();
        assert!(registry.chain(HookType::OnTransition, "s2").is_empty());
    }

    #[test]
    fn deregister_and_clear() {
        let registry = HookRegistry::new();
        registry
            .register(hook("a", HookType::Periodic, 10), HookScope::Deployment)
            .unwrap();
        registry
            .register(
                hook("b", HookType::Periodic, 10),
                HookScope::Session("s1".into()),
            )
            .unwrap();

        assert!(registry.deregister("a", &HookScope::Deployment));
        assert!(!registry.deregister("a", &HookScope::Deployment));
        assert_eq!(registry.registered_count(&HookScope::Deployment), 0);

        registry.clear_session("s1");
        assert_eq!(
            registry.registered_count(&HookScope::Session("s1".into())),
            0
        );
    }
}
