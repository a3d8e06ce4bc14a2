//! Hook system type definitions
//!
//! The action contract is a closed sum: a hook either continues, aborts
//! the chain with a reason, or replaces the in-flight context and/or
//! constitution. Everything else (timeouts, panics, invalid results) is
//! normalized to `Continue` by the executor and counted as an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use vcp_core::{Constitution, VcpContext};

/// The six hook interception points in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    PreInject,
    PostSelect,
    OnTransition,
    OnConflict,
    OnViolation,
    Periodic,
}

impl HookType {
    /// All hook types.
    pub const ALL: [HookType; 6] = [
        HookType::PreInject,
        HookType::PostSelect,
        HookType::OnTransition,
        HookType::OnConflict,
        HookType::OnViolation,
        HookType::Periodic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreInject => "pre_inject",
            Self::PostSelect => "post_select",
            Self::OnTransition => "on_transition",
            Self::OnConflict => "on_conflict",
            Self::OnViolation => "on_violation",
            Self::Periodic => "periodic",
        }
    }
}

/// Validation bounds for hook definitions.
pub const MIN_PRIORITY: u8 = 0;
pub const MAX_PRIORITY: u8 = 100;
pub const MIN_TIMEOUT_MS: u64 = 1;
pub const MAX_TIMEOUT_MS: u64 = 30_000;

static HOOK_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,64}$").unwrap_or_else(|_| unreachable!()));

/// Errors raised by hook registration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    /// Hook definition failed validation
    #[error("Invalid hook definition: {message}")]
    Validation {
        /// What failed and the offending value
        message: String,
    },

    /// A hook with the same name exists in the target scope
    #[error("Hook '{name}' already registered in {scope}")]
    Duplicate {
        /// Hook name
        name: String,
        /// Scope description
        scope: String,
    },
}

/// Type-specific event payloads.
#[derive(Debug, Clone, Default)]
pub enum HookEvent {
    /// Fired before a constitution is injected into model context
    PreInject {
        injection_target: String,
        injection_format: String,
        raw_constitution: String,
        /// Environments the bundle's scope allows (empty = unrestricted)
        scope_environments: Vec<String>,
    },
    /// Fired after the adaptation layer selects a constitution
    PostSelect {
        candidates: Vec<String>,
        selection_rationale: String,
        scores: BTreeMap<String, f64>,
    },
    /// Fired when the context state machine transitions
    Transition {
        previous_state: String,
        new_state: String,
        trigger: String,
        changed_dimensions: Vec<String>,
    },
    /// Fired when composition detects conflicting rules
    Conflict {
        conflicting_rules: Vec<String>,
        composition_strategy: String,
        conflict_severity: String,
    },
    /// Fired when a rule violation is detected in model output
    Violation {
        output: String,
        violated_rules: Vec<String>,
        severity: String,
        retry_count: u32,
    },
    /// Fired on a timer
    Periodic {
        elapsed_ms: u64,
        interval_ms: u64,
        tick_count: u64,
    },
    /// No payload
    #[default]
    Empty,
}

/// Input passed to a hook action.
///
/// `chain_state` is a mutable key/value store that accumulates across the
/// hooks of one chain execution only; it never survives across calls.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    pub context: Option<VcpContext>,
    pub constitution: Option<Constitution>,
    pub event: HookEvent,
    pub session: BTreeMap<String, Value>,
    pub chain_state: BTreeMap<String, Value>,
}

/// Structured return value from a hook action.
#[derive(Debug, Clone, Default)]
pub enum HookResult {
    /// No change; pass to the next hook
    #[default]
    Continue,
    /// Stop the chain and cancel the pipeline operation
    Abort {
        /// Human-readable justification
        reason: String,
    },
    /// Replace context and/or constitution for subsequent hooks
    Modify {
        context: Option<VcpContext>,
        constitution: Option<Constitution>,
    },
}

impl HookResult {
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort {
            reason: reason.into(),
        }
    }

    /// Status label used in logs and chain records.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Abort { .. } => "abort",
            Self::Modify { .. } => "modify",
        }
    }
}

/// Hook action callable. Runs on an executor-managed thread; must not
/// assume it outlives its deadline.
pub type HookAction = Arc<dyn Fn(&mut HookInput) -> HookResult + Send + Sync>;

/// Predicate gating a hook's execution.
pub type HookPredicate = Arc<dyn Fn(&HookInput) -> bool + Send + Sync>;

/// A registered hook.
#[derive(Clone)]
pub struct Hook {
    /// Unique within scope; must match `[a-z0-9_-]{1,64}`
    pub name: String,
    pub hook_type: HookType,
    /// 0-100 inclusive; higher runs first
    pub priority: u8,
    pub action: HookAction,
    /// Wall-clock deadline per invocation (1-30000 ms)
    pub timeout_ms: u64,
    /// Disabled hooks are skipped without counting as executed
    pub enabled: bool,
    /// Optional predicate; the hook fires only if it returns true
    pub condition: Option<HookPredicate>,
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("type", &self.hook_type.as_str())
            .field("priority", &self.priority)
            .field("timeout_ms", &self.timeout_ms)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Hook {
    /// Create an enabled hook with a 5 s default deadline.
    pub fn new(
        name: impl Into<String>,
        hook_type: HookType,
        priority: u8,
        action: HookAction,
    ) -> Self {
        Self {
            name: name.into(),
            hook_type,
            priority,
            action,
            timeout_ms: 5_000,
            enabled: true,
            condition: None,
            description: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn condition(mut self, predicate: HookPredicate) -> Self {
        self.condition = Some(predicate);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validate this hook definition.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Validation`] when the name, priority, or
    /// timeout is out of range.
    pub fn validate(&self) -> Result<(), HookError> {
        if !HOOK_NAME_PATTERN.is_match(&self.name) {
            return Err(HookError::Validation {
                message: format!("invalid hook name '{}': must match [a-z0-9_-]{{1,64}}", self.name),
            });
        }
        if self.priority > MAX_PRIORITY {
            return Err(HookError::Validation {
                message: format!(
                    "priority must be {MIN_PRIORITY}-{MAX_PRIORITY}, got {}",
                    self.priority
                ),
            });
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(HookError::Validation {
                message: format!(
                    "timeout must be {MIN_TIMEOUT_MS}-{MAX_TIMEOUT_MS}ms, got {}",
                    self.timeout_ms
                ),
            });
        }
        Ok(())
    }
}

/// Disposition of one hook within a chain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDisposition {
    Completed,
    TimedOut,
    Failed,
}

/// Per-hook record in a chain result.
#[derive(Debug, Clone)]
pub struct HookRecord {
    pub name: String,
    /// Result status label, or the failure disposition
    pub status: String,
    pub disposition: HookDisposition,
    pub duration_ms: u64,
}

/// Terminal status of a chain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Completed,
    Aborted,
}

/// Result of executing a hook chain.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub status: ChainStatus,
    /// Final context (possibly modified by hooks)
    pub context: Option<VcpContext>,
    /// Final constitution (possibly modified by hooks)
    pub constitution: Option<Constitution>,
    pub hook_records: Vec<HookRecord>,
    /// Set when aborted
    pub reason: Option<String>,
    /// Name of the hook that caused the abort
    pub aborted_by: Option<String>,
    /// True when more than half of the executed hooks failed
    pub cascade_failure: bool,
}

impl ChainResult {
    /// Untouched pass-through result for an empty chain.
    pub fn completed(context: Option<VcpContext>, constitution: Option<Constitution>) -> Self {
        Self {
            status: ChainStatus::Completed,
            context,
            constitution,
            hook_records: Vec::new(),
            reason: None,
            aborted_by: None,
            cascade_failure: false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.status == ChainStatus::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> HookAction {
        Arc::new(|_| HookResult::Continue)
    }

    #[test]
    fn valid_hook_passes() {
        let hook = Hook::new("my-hook_1", HookType::PreInject, 50, noop());
        assert!(hook.validate().is_ok());
    }

    #[test]
    fn bad_names_rejected() {
        for name in ["", "Has-Upper", "has space", &"x".repeat(65)] {
            let hook = Hook::new(name, HookType::PreInject, 50, noop());
            assert!(hook.validate().is_err(), "name {name:?} should fail");
        }
    }

    #[test]
    fn priority_and_timeout_bounds() {
        let hook = Hook::new("h", HookType::Periodic, 101, noop());
        assert!(hook.validate().is_err());

        let hook = Hook::new("h", HookType::Periodic, 100, noop()).timeout_ms(0);
        assert!(hook.validate().is_err());

        let hook = Hook::new("h", HookType::Periodic, 100, noop()).timeout_ms(30_001);
        assert!(hook.validate().is_err());

        let hook = Hook::new("h", HookType::Periodic, 100, noop()).timeout_ms(30_000);
        assert!(hook.validate().is_ok());
    }
}
