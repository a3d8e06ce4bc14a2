//! Context state tracking and transition classification
//!
//! The tracker keeps a bounded history of `(timestamp, context)` pairs.
//! Every `record` classifies the change against the previous entry:
//! an emergency value anywhere in the new context is `emergency`; a
//! change to a major dimension (occasion, agency, constraints) or to
//! three or more dimensions is `major`; any other change is `minor`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use vcp_core::{Dimension, VcpContext};
use vcp_hooks::{ChainStatus, HookEvent, HookExecutor, HookType};

/// Dimensions whose change alone makes a transition major.
pub const MAJOR_DIMENSIONS: [Dimension; 3] = [
    Dimension::Occasion,
    Dimension::Agency,
    Dimension::Constraints,
];

/// Value symbols that mark an emergency state: 🚨, ⚠️, 🆘.
pub const EMERGENCY_VALUES: [&str; 3] = ["\u{1F6A8}", "\u{26A0}\u{FE0F}", "\u{1F198}"];

/// Transition severity levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransitionSeverity {
    None,
    Minor,
    Major,
    Emergency,
}

impl TransitionSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Emergency => "emergency",
        }
    }
}

/// A detected context transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub severity: TransitionSeverity,
    pub changed_dimensions: Vec<Dimension>,
    pub previous: VcpContext,
    pub current: VcpContext,
    pub timestamp: DateTime<Utc>,
}

impl Transition {
    /// Major or emergency.
    pub fn is_significant(&self) -> bool {
        self.severity >= TransitionSeverity::Major
    }

    pub fn is_emergency(&self) -> bool {
        self.severity == TransitionSeverity::Emergency
    }
}

type TransitionHandler = Arc<dyn Fn(&Transition) + Send + Sync>;

/// Bounded-history context tracker with severity handlers and hook
/// integration.
///
/// `record` calls are serialized per tracker instance by `&mut self`;
/// the order of records defines the transition history order.
pub struct StateTracker {
    history: Vec<(DateTime<Utc>, VcpContext)>,
    max_history: usize,
    handlers: Vec<(usize, TransitionSeverity, TransitionHandler)>,
    next_handler_id: usize,
    hook_executor: Option<Arc<HookExecutor>>,
    session_id: String,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new(100)
    }
}

impl StateTracker {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Vec::new(),
            max_history,
            handlers: Vec::new(),
            next_handler_id: 0,
            hook_executor: None,
            session_id: "default".to_string(),
        }
    }

    /// Attach a hook executor so `on_transition` chains fire on every
    /// non-none transition. An aborting chain rolls the record back.
    pub fn with_hook_executor(mut self, executor: Arc<HookExecutor>) -> Self {
        self.hook_executor = Some(executor);
        self
    }

    /// Session id used for hook chain resolution.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Record a new context state.
    ///
    /// Returns the transition against the previous record, `None` for
    /// the first record, and `None` when an `on_transition` hook aborts
    /// (in which case the record is rolled back).
    pub fn record(&mut self, context: VcpContext) -> Option<Transition> {
        self.record_at(context, Utc::now())
    }

    /// `record` with an explicit timestamp.
    pub fn record_at(
        &mut self,
        context: VcpContext,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        if self.history.is_empty() {
            self.history.push((now, context));
            return None;
        }

        let previous = self.history[self.history.len() - 1].1.clone();
        let transition = detect_transition(&previous, &context, now);

        self.history.push((now, context.clone()));
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }

        if transition.severity != TransitionSeverity::None {
            if let Some(executor) = &self.hook_executor {
                let event = HookEvent::Transition {
                    previous_state: transition.previous.encode(),
                    new_state: transition.current.encode(),
                    trigger: transition.severity.as_str().to_string(),
                    changed_dimensions: transition
                        .changed_dimensions
                        .iter()
                        .map(|d| d.name().to_string())
                        .collect(),
                };
                let chain = executor.execute(
                    HookType::OnTransition,
                    &self.session_id,
                    Some(context),
                    None,
                    event,
                    None,
                );
                if chain.status == ChainStatus::Aborted {
                    warn!(
                        aborted_by = chain.aborted_by.as_deref().unwrap_or("unknown"),
                        "on_transition hook blocked transition; rolling back"
                    );
                    self.history.pop();
                    return None;
                }
            }

            for (_, severity, handler) in &self.handlers {
                if *severity == transition.severity {
                    handler(&transition);
                }
            }
        }

        debug!(
            severity = transition.severity.as_str(),
            changed = transition.changed_dimensions.len(),
            "context recorded"
        );
        Some(transition)
    }

    /// Register a handler for one severity level. Returns a handle for
    /// `unregister_handler`.
    pub fn register_handler(
        &mut self,
        severity: TransitionSeverity,
        handler: TransitionHandler,
    ) -> usize {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.handlers.push((id, severity, handler));
        id
    }

    /// Remove a handler by its handle.
    pub fn unregister_handler(&mut self, id: usize) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        self.handlers.len() < before
    }

    /// Current context, if any has been recorded.
    pub fn current(&self) -> Option<&VcpContext> {
        self.history.last().map(|(_, ctx)| ctx)
    }

    pub fn history(&self) -> &[(DateTime<Utc>, VcpContext)] {
        &self.history
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    /// Most recent `count` entries.
    pub fn recent(&self, count: usize) -> &[(DateTime<Utc>, VcpContext)] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Recompute transitions over the stored history at or above a
    /// minimum severity.
    pub fn find_transitions(&self, min_severity: TransitionSeverity) -> Vec<Transition> {
        if self.history.len() < 2 {
            return Vec::new();
        }
        self.history
            .windows(2)
            .map(|pair| detect_transition(&pair[0].1, &pair[1].1, pair[1].0))
            .filter(|t| t.severity >= min_severity)
            .collect()
    }
}

/// Classify the change between two contexts.
fn detect_transition(
    previous: &VcpContext,
    current: &VcpContext,
    now: DateTime<Utc>,
) -> Transition {
    let changed: Vec<Dimension> = Dimension::ALL
        .into_iter()
        .filter(|dim| {
            let prev: HashSet<&String> = previous.get(*dim).iter().collect();
            let curr: HashSet<&String> = current.get(*dim).iter().collect();
            prev != curr
        })
        .collect();

    let has_emergency = current
        .all_values()
        .any(|value| EMERGENCY_VALUES.contains(&value));

    let severity = if has_emergency {
        TransitionSeverity::Emergency
    } else if changed.iter().any(|d| MAJOR_DIMENSIONS.contains(d)) || changed.len() >= 3 {
        TransitionSeverity::Major
    } else if !changed.is_empty() {
        TransitionSeverity::Minor
    } else {
        TransitionSeverity::None
    };

    Transition {
        severity,
        changed_dimensions: changed,
        previous: previous.clone(),
        current: current.clone(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ContextEncoder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vcp_hooks::{Hook, HookRegistry, HookResult, HookScope};

    #[test]
    fn first_record_has_no_transition() {
        let mut tracker = StateTracker::default();
        let ctx = ContextEncoder::new().time("morning").build();
        assert!(tracker.record(ctx).is_none());
        assert_eq!(tracker.history_count(), 1);
    }

    #[test]
    fn single_dimension_change_is_minor() {
        let mut tracker = StateTracker::default();
        tracker.record(ContextEncoder::new().time("morning").build());
        let transition = tracker
            .record(ContextEncoder::new().time("evening").build())
            .unwrap();
        assert_eq!(transition.severity, TransitionSeverity::Minor);
        assert_eq!(transition.changed_dimensions, vec![Dimension::Time]);
    }

    #[test]
    fn three_dimension_change_is_major() {
        let mut tracker = StateTracker::default();
        tracker.record(ContextEncoder::new().time("morning").build());
        let transition = tracker
            .record(
                ContextEncoder::new()
                    .time("evening")
                    .space("office")
                    .state("tired")
                    .build(),
            )
            .unwrap();
        assert_eq!(transition.severity, TransitionSeverity::Major);
        assert_eq!(transition.changed_dimensions.len(), 3);
    }

    #[test]
    fn major_dimension_change_is_major() {
        let mut tracker = StateTracker::default();
        tracker.record(ContextEncoder::new().agency("peer").build());
        let transition = tracker
            .record(ContextEncoder::new().agency("limited").build())
            .unwrap();
        assert_eq!(transition.severity, TransitionSeverity::Major);
    }

    #[test]
    fn emergency_value_is_emergency() {
        let mut tracker = StateTracker::default();
        tracker.record(ContextEncoder::new().occasion("normal").build());
        let transition = tracker
            .record(ContextEncoder::new().occasion("emergency").build())
            .unwrap();
        assert_eq!(transition.severity, TransitionSeverity::Emergency);
        assert!(transition.is_emergency());
    }

    #[test]
    fn no_change_is_none_severity() {
        let mut tracker = StateTracker::default();
        let ctx = ContextEncoder::new().time("morning").build();
        tracker.record(ctx.clone());
        let transition = tracker.record(ctx).unwrap();
        assert_eq!(transition.severity, TransitionSeverity::None);
    }

    #[test]
    fn history_bounded() {
        let mut tracker = StateTracker::new(3);
        for value in ["morning", "midday", "evening", "night"] {
            tracker.record(ContextEncoder::new().time(value).build());
        }
        assert_eq!(tracker.history_count(), 3);
        let current = tracker.current().unwrap();
        assert_eq!(
            current.get(Dimension::Time),
            [Dimension::Time.symbol_for("night").unwrap()]
        );
    }

    #[test]
    fn handlers_fire_per_severity() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let mut tracker = StateTracker::default();
        tracker.register_handler(
            TransitionSeverity::Minor,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tracker.record(ContextEncoder::new().time("morning").build());
        tracker.record(ContextEncoder::new().time("evening").build());
        tracker.record(ContextEncoder::new().agency("leader").time("evening").build());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_handler_stops_calls() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let mut tracker = StateTracker::default();
        let id = tracker.register_handler(
            TransitionSeverity::Minor,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(tracker.unregister_handler(id));
        assert!(!tracker.unregister_handler(id));

        tracker.record(ContextEncoder::new().time("morning").build());
        tracker.record(ContextEncoder::new().time("evening").build());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hook_abort_rolls_back_record() {
        let registry = Arc::new(HookRegistry::new());
        let abort: vcp_hooks::types::HookAction =
            Arc::new(|_| HookResult::abort("transition denied"));
        registry
            .register(
                Hook::new("blocker", HookType::OnTransition, 50, abort),
                HookScope::Deployment,
            )
            .unwrap();
        let mut tracker =
            StateTracker::default().with_hook_executor(Arc::new(HookExecutor::new(registry)));

        tracker.record(ContextEncoder::new().time("morning").build());
        let result = tracker.record(ContextEncoder::new().time("evening").build());
        assert!(result.is_none());
        assert_eq!(tracker.history_count(), 1);
    }

    #[test]
    fn find_transitions_filters_by_severity() {
        let mut tracker = StateTracker::default();
        tracker.record(ContextEncoder::new().time("morning").build());
        tracker.record(ContextEncoder::new().time("evening").build());
        tracker.record(ContextEncoder::new().time("evening").occasion("emergency").build());

        assert_eq!(tracker.find_transitions(TransitionSeverity::Minor).len(), 2);
        assert_eq!(tracker.find_transitions(TransitionSeverity::Major).len(), 1);
        assert_eq!(
            tracker.find_transitions(TransitionSeverity::Emergency).len(),
            1
        );
    }
}
