//! Hook chain executor
//!
//! Runs chains in priority order with a hard wall-clock deadline per
//! action. Each action runs on a dedicated thread and reports back over
//! a channel; when the deadline passes first, the result is abandoned
//! and the pipeline state the action saw is discarded, so a late action
//! can never mutate anything the chain goes on to use.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, warn};
use vcp_core::{Constitution, VcpContext};

use crate::registry::HookRegistry;
use crate::types::{
    ChainResult, ChainStatus, Hook, HookDisposition, HookEvent, HookInput, HookRecord, HookResult,
    HookType,
};

type ChainState = BTreeMap<String, Value>;

enum ActionOutcome {
    Done(HookResult, ChainState),
    TimedOut,
    Panicked,
}

/// Execute hook chains with timeout enforcement and error containment.
///
/// Failure policy is fail-open throughout: a timed-out, panicking, or
/// predicate-failing hook is treated as `continue` and counted toward
/// cascade detection. Only an explicit `abort` stops the chain.
#[derive(Clone)]
pub struct HookExecutor {
    registry: Arc<HookRegistry>,
}

impl HookExecutor {
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this executor reads chains from.
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Execute the chain for a hook type and session.
    pub fn execute(
        &self,
        hook_type: HookType,
        session_id: &str,
        context: Option<VcpContext>,
        constitution: Option<Constitution>,
        event: HookEvent,
        session_info: Option<BTreeMap<String, Value>>,
    ) -> ChainResult {
        let chain = self.registry.chain(hook_type, session_id);
        if chain.is_empty() {
            return ChainResult::completed(context, constitution);
        }

        let session = session_info.unwrap_or_default();
        let mut chain_state = ChainState::new();
        let mut current_context = context;
        let mut current_constitution = constitution;
        let mut records = Vec::new();
        let mut errors = 0usize;
        let mut executed = 0usize;

        for hook in &chain {
            if !hook.enabled {
                debug!(name = %hook.name, "hook skipped: disabled");
                continue;
            }

            let input = HookInput {
                context: current_context.clone(),
                constitution: current_constitution.clone(),
                event: event.clone(),
                session: session.clone(),
                chain_state: chain_state.clone(),
            };

            if let Some(condition) = &hook.condition {
                let predicate = condition.clone();
                match catch_unwind(AssertUnwindSafe(|| predicate(&input))) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(name = %hook.name, "hook skipped: predicate false");
                        continue;
                    }
                    Err(_) => {
                        warn!(name = %hook.name, "hook skipped: predicate panicked");
                        continue;
                    }
                }
            }

            executed += 1;
            debug!(name = %hook.name, hook_type = hook_type.as_str(), "hook fired");
            let started = Instant::now();
            let outcome = run_with_deadline(hook, input);
            let duration_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                ActionOutcome::Done(result, new_state) => {
                    chain_state = new_state;
                    records.push(HookRecord {
                        name: hook.name.clone(),
                        status: result.status().to_string(),
                        disposition: HookDisposition::Completed,
                        duration_ms,
                    });
                    result
                }
                ActionOutcome::TimedOut => {
                    warn!(
                        name = %hook.name,
                        timeout_ms = hook.timeout_ms,
                        elapsed_ms = duration_ms,
                        "hook timed out; treating as continue"
                    );
                    errors += 1;
                    records.push(HookRecord {
                        name: hook.name.clone(),
                        status: "continue".to_string(),
                        disposition: HookDisposition::TimedOut,
                        duration_ms,
                    });
                    HookResult::Continue
                }
                ActionOutcome::Panicked => {
                    error!(name = %hook.name, elapsed_ms = duration_ms, "hook panicked");
                    errors += 1;
                    records.push(HookRecord {
                        name: hook.name.clone(),
                        status: "continue".to_string(),
                        disposition: HookDisposition::Failed,
                        duration_ms,
                    });
                    HookResult::Continue
                }
            };

            debug!(
                name = %hook.name,
                status = result.status(),
                duration_ms,
                "hook completed"
            );

            match result {
                HookResult::Continue => {}
                HookResult::Abort { reason } => {
                    return ChainResult {
                        status: ChainStatus::Aborted,
                        context: current_context,
                        constitution: current_constitution,
                        hook_records: records,
                        reason: Some(reason),
                        aborted_by: Some(hook.name.clone()),
                        cascade_failure: false,
                    };
                }
                HookResult::Modify {
                    context,
                    constitution,
                } => {
                    if let Some(ctx) = context {
                        current_context = Some(ctx);
                    }
                    if let Some(c) = constitution {
                        current_constitution = Some(c);
                    }
                }
            }
        }

        let cascade_failure = executed > 0 && errors * 2 > executed;
        if cascade_failure {
            warn!(
                hook_type = hook_type.as_str(),
                executed, errors, "hook cascade failure"
            );
        }

        ChainResult {
            status: ChainStatus::Completed,
            context: current_context,
            constitution: current_constitution,
            hook_records: records,
            reason: None,
            aborted_by: None,
            cascade_failure,
        }
    }
}

/// Run a hook action on its own thread with a wall-clock deadline.
///
/// On timeout the receiver is dropped; whatever the abandoned thread
/// later sends goes nowhere. A panicked action drops the sender, which
/// surfaces as a disconnect.
fn run_with_deadline(hook: &Hook, mut input: HookInput) -> ActionOutcome {
    let (tx, rx) = mpsc::channel();
    let action = hook.action.clone();

    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let result = action(&mut input);
            (result, input.chain_state)
        }));
        if let Ok(payload) = result {
            // Receiver may already be gone after a timeout; ignore
            let _ = tx.send(payload);
        }
    });

    match rx.recv_timeout(Duration::from_millis(hook.timeout_ms)) {
        Ok((result, state)) => ActionOutcome::Done(result, state),
        Err(mpsc::RecvTimeoutError::Timeout) => ActionOutcome::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => ActionOutcome::Panicked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HookScope;
    use crate::types::HookAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor_with(hooks: Vec<Hook>) -> HookExecutor {
        let registry = Arc::new(HookRegistry::new());
        for hook in hooks {
            registry.register(hook, HookScope::Deployment).unwrap();
        }
        HookExecutor::new(registry)
    }

    fn continue_hook(name: &str, priority: u8, counter: Arc<AtomicUsize>) -> Hook {
        let action: HookAction = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            HookResult::Continue
        });
        Hook::new(name, HookType::PreInject, priority, action)
    }

    #[test]
    fn empty_chain_passes_through() {
        let executor = executor_with(vec![]);
        let result = executor.execute(
            HookType::PreInject,
            "s1",
            None,
            Some(Constitution::new("c", vec!["rule".into()])),
            HookEvent::Empty,
            None,
        );
        assert_eq!(result.status, ChainStatus::Completed);
        assert_eq!(result.constitution.unwrap().id, "c");
        assert!(result.hook_records.is_empty());
    }

    #[test]
    fn abort_short_circuits() {
        let counter = Arc::new(AtomicUsize::new(0));
        let abort: HookAction = Arc::new(|_| HookResult::abort("blocked"));
        let executor = executor_with(vec![
            continue_hook("first", 90, counter.clone()),
            Hook::new("blocker", HookType::PreInject, 50, abort),
            continue_hook("never", 10, counter.clone()),
        ]);

        let result = executor.execute(HookType::PreInject, "s1", None, None, HookEvent::Empty, None);
        assert!(result.is_aborted());
        assert_eq!(result.aborted_by.as_deref(), Some("blocker"));
        assert_eq!(result.reason.as_deref(), Some("blocked"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn modify_replaces_constitution_for_later_hooks() {
        let swap: HookAction = Arc::new(|_| HookResult::Modify {
            context: None,
            constitution: Some(Constitution::new("swapped", vec!["new rule".into()])),
        });
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let seen_clone = seen.clone();
        let observe: HookAction = Arc::new(move |input| {
            if let Some(c) = &input.constitution {
                *seen_clone.lock() = c.id.clone();
            }
            HookResult::Continue
        });

        let executor = executor_with(vec![
            Hook::new("swap", HookType::PreInject, 90, swap),
            Hook::new("observe", HookType::PreInject, 10, observe),
        ]);
        let result = executor.execute(
            HookType::PreInject,
            "s1",
            None,
            Some(Constitution::new("orig", vec!["r".into()])),
            HookEvent::Empty,
            None,
        );
        assert_eq!(result.constitution.unwrap().id, "swapped");
        assert_eq!(*seen.lock(), "swapped");
    }

    #[test]
    fn timeout_does_not_alter_state() {
        let slow: HookAction = Arc::new(|input| {
            std::thread::sleep(Duration::from_millis(200));
            input
                .chain_state
                .insert("late".into(), Value::Bool(true));
            HookResult::Modify {
                context: None,
                constitution: Some(Constitution::new("late", vec!["x".into()])),
            }
        });
        let executor = executor_with(vec![
            Hook::new("slow", HookType::PreInject, 50, slow).timeout_ms(20)
        ]);

        let original = Constitution::new("orig", vec!["r".into()]);
        let result = executor.execute(
            HookType::PreInject,
            "s1",
            None,
            Some(original.clone()),
            HookEvent::Empty,
            None,
        );
        assert_eq!(result.status, ChainStatus::Completed);
        assert_eq!(result.constitution.unwrap(), original);
        assert_eq!(
            result.hook_records[0].disposition,
            HookDisposition::TimedOut
        );
    }

    #[test]
    fn panic_counts_as_error_and_chain_continues() {
        let counter = Arc::new(AtomicUsize::new(0));
        let panicky: HookAction = Arc::new(|_| panic!("boom"));
        let executor = executor_with(vec![
            Hook::new("panicky", HookType::PreInject, 90, panicky),
            continue_hook("survivor", 10, counter.clone()),
        ]);

        let result = executor.execute(HookType::PreInject, "s1", None, None, HookEvent::Empty, None);
        assert_eq!(result.status, ChainStatus::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!result.cascade_failure);
    }

    #[test]
    fn cascade_failure_detected() {
        let p1: HookAction = Arc::new(|_| panic!("a"));
        let p2: HookAction = Arc::new(|_| panic!("b"));
        let ok: HookAction = Arc::new(|_| HookResult::Continue);
        let executor = executor_with(vec![
            Hook::new("p1", HookType::PreInject, 90, p1),
            Hook::new("p2", HookType::PreInject, 80, p2),
            Hook::new("ok", HookType::PreInject, 70, ok),
        ]);

        let result = executor.execute(HookType::PreInject, "s1", None, None, HookEvent::Empty, None);
        assert!(result.cascade_failure);
    }

    #[test]
    fn predicate_false_and_panic_both_skip() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let gated: HookAction = Arc::new(move |_| {
            counter2.fetch_add(1, Ordering::SeqCst);
            HookResult::Continue
        });
        let never = Hook::new("never", HookType::PreInject, 90, gated.clone())
            .condition(Arc::new(|_| false));
        let broken = Hook::new("broken", HookType::PreInject, 80, gated)
            .condition(Arc::new(|_| panic!("pred")));

        let executor = executor_with(vec![never, broken]);
        let result = executor.execute(HookType::PreInject, "s1", None, None, HookEvent::Empty, None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // Skipped hooks do not count as executed
        assert!(result.hook_records.is_empty());
        assert!(!result.cascade_failure);
    }

    #[test]
    fn chain_state_accumulates_within_one_call() {
        let writer: HookAction = Arc::new(|input| {
            input
                .chain_state
                .insert("selected".into(), Value::String("nanny".into()));
            HookResult::Continue
        });
        let saw = Arc::new(parking_lot::Mutex::new(None));
        let saw_clone = saw.clone();
        let reader: HookAction = Arc::new(move |input| {
            *saw_clone.lock() = input.chain_state.get("selected").cloned();
            HookResult::Continue
        });

        let executor = executor_with(vec![
            Hook::new("writer", HookType::PostSelect, 90, writer),
            Hook::new("reader", HookType::PostSelect, 10, reader),
        ]);
        executor.execute(HookType::PostSelect, "s1", None, None, HookEvent::Empty, None);
        assert_eq!(*saw.lock(), Some(Value::String("nanny".into())));

        // A second call starts from an empty chain state
        executor.execute(HookType::PostSelect, "s1", None, None, HookEvent::Empty, None);
        assert_eq!(*saw.lock(), Some(Value::String("nanny".into())));
    }
}
