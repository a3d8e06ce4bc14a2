//! Built-in hooks
//!
//! Reference implementations of common hook patterns. Register them
//! directly or use them as templates for custom hooks.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use vcp_core::Dimension;

use crate::types::{Hook, HookEvent, HookResult, HookType};

/// Indicators that children are present in the company dimension.
const CHILDREN_INDICATORS: [&str; 4] = ["children", "child", "kids", "minors"];

/// States that escalate adherence when transitioned into.
const EMERGENCY_STATES: [&str; 3] = ["emergency", "crisis", "critical"];

/// Persona selection hook (post_select, priority 80).
///
/// Switches to the child-safe persona when children are detected in the
/// context's company dimension. The selection is communicated to
/// downstream hooks through `chain_state["selected_persona"]`.
pub fn persona_select_hook() -> Hook {
    let action = Arc::new(|input: &mut crate::types::HookInput| {
        let Some(context) = &input.context else {
            return HookResult::Continue;
        };

        let children_symbol = Dimension::Company.symbol_for("children").unwrap_or("");
        let has_children = context.get(Dimension::Company).iter().any(|value| {
            value == children_symbol
                || CHILDREN_INDICATORS.contains(&value.to_ascii_lowercase().as_str())
        });

        if has_children {
            input
                .chain_state
                .insert("selected_persona".into(), Value::String("nanny".into()));
            return HookResult::Modify {
                context: input.context.clone(),
                constitution: None,
            };
        }
        HookResult::Continue
    });

    Hook::new("persona_select", HookType::PostSelect, 80, action)
        .description("Select persona based on context (children present -> nanny)")
}

/// Adherence escalation hook (on_transition, priority 90).
///
/// Marks the chain state when a transition enters an emergency state so
/// downstream selection can raise the adherence level.
pub fn adherence_escalate_hook() -> Hook {
    let action = Arc::new(|input: &mut crate::types::HookInput| {
        let is_emergency = match &input.event {
            HookEvent::Transition {
                new_state, trigger, ..
            } => {
                EMERGENCY_STATES.contains(&trigger.as_str())
                    || EMERGENCY_STATES
                        .iter()
                        .any(|s| new_state.to_ascii_lowercase().contains(s))
            }
            _ => false,
        };

        if is_emergency {
            input
                .chain_state
                .insert("adherence_escalated".into(), Value::Bool(true));
            return HookResult::Modify {
                context: input.context.clone(),
                constitution: None,
            };
        }
        HookResult::Continue
    });

    Hook::new("adherence_escalate", HookType::OnTransition, 90, action)
        .timeout_ms(3_000)
        .description("Increase adherence level during emergency state")
}

/// Scope filter hook (pre_inject, priority 95).
///
/// Aborts injection when the bundle's scope restricts environments and
/// the session's environment is not among them.
pub fn scope_filter_hook() -> Hook {
    let action = Arc::new(|input: &mut crate::types::HookInput| {
        let HookEvent::PreInject {
            scope_environments, ..
        } = &input.event
        else {
            return HookResult::Continue;
        };
        if scope_environments.is_empty() {
            return HookResult::Continue;
        }

        let current_env = input
            .session
            .get("environment")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if current_env.is_empty() || scope_environments.iter().any(|e| e == current_env) {
            return HookResult::Continue;
        }

        HookResult::abort(format!(
            "constitution out of scope: environment '{current_env}' not in allowed environments {scope_environments:?}"
        ))
    });

    Hook::new("scope_filter", HookType::PreInject, 95, action)
        .timeout_ms(2_000)
        .description("Skip constitutions out of scope for current environment")
}

/// Audit hook (pre_inject by default, priority 10).
///
/// Logs execution details and always continues. Runs last so it
/// captures the state after the rest of the chain has processed.
pub fn audit_hook() -> Hook {
    let action = Arc::new(|input: &mut crate::types::HookInput| {
        let session_id = input
            .session
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let constitution_id = input
            .constitution
            .as_ref()
            .map(|c| c.id.as_str())
            .unwrap_or("none");
        let chain_keys: Vec<&String> = input.chain_state.keys().collect();
        info!(
            session_id,
            constitution_id,
            chain_state_keys = ?chain_keys,
            "hook audit"
        );
        HookResult::Continue
    });

    Hook::new("audit", HookType::PreInject, 10, action)
        .timeout_ms(2_000)
        .description("Log every hook execution to the audit trail")
}
