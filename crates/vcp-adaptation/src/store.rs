//! Session state persistence interface
//!
//! Per-session trackers are owned by one session at a time. Deployments
//! that need cross-worker persistence implement [`SessionStateStore`]
//! over an external backend; the in-memory implementation here is the
//! reference for semantics.

use std::collections::HashMap;

use parking_lot::Mutex;
use vcp_core::{Result, VcpContext};

use crate::state::{StateTracker, Transition};

/// Session-keyed context state, mirroring the tracker interface.
pub trait SessionStateStore: Send + Sync {
    /// Record a context for a session; returns the detected transition.
    fn record(&self, session_id: &str, context: VcpContext) -> Result<Option<Transition>>;

    /// Current context for a session.
    fn current(&self, session_id: &str) -> Result<Option<VcpContext>>;

    /// Number of history entries for a session.
    fn history_count(&self, session_id: &str) -> Result<usize>;

    /// Drop all state for a session.
    fn clear(&self, session_id: &str) -> Result<()>;
}

/// In-memory reference implementation: one tracker per session behind a
/// lock, so per-session operations are serialized.
pub struct InMemorySessionStore {
    trackers: Mutex<HashMap<String, StateTracker>>,
    max_history: usize,
}

impl InMemorySessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            trackers: Mutex::new(HashMap::new()),
            max_history,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SessionStateStore for InMemorySessionStore {
    fn record(&self, session_id: &str, context: VcpContext) -> Result<Option<Transition>> {
        let mut trackers = self.trackers.lock();
        let tracker = trackers
            .entry(session_id.to_string())
            .or_insert_with(|| StateTracker::new(self.max_history).with_session_id(session_id));
        Ok(tracker.record(context))
    }

    fn current(&self, session_id: &str) -> Result<Option<VcpContext>> {
        Ok(self
            .trackers
            .lock()
            .get(session_id)
            .and_then(|t| t.current().cloned()))
    }

    fn history_count(&self, session_id: &str) -> Result<usize> {
        Ok(self
            .trackers
            .lock()
            .get(session_id)
            .map(StateTracker::history_count)
            .unwrap_or(0))
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        self.trackers.lock().remove(session_id);
        Ok(())
    }
}
