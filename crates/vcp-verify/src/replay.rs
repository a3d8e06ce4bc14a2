//! Replay cache: at-most-once admission per jti
//!
//! Maps `jti -> exp`. Expired entries are removed lazily on reads, and
//! the oldest-expiring entries are evicted when the capacity bound is
//! exceeded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use vcp_core::constants::REPLAY_CACHE_CAPACITY;

/// Bounded cache of seen bundle ids within their validity windows.
pub struct ReplayCache {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    max_entries: usize,
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::with_capacity(REPLAY_CACHE_CAPACITY)
    }
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Check whether a jti has been seen (non-expired entries only).
    pub fn is_seen(&self, jti: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, exp| *exp >= now);
        seen.contains_key(jti)
    }

    /// Record a jti as seen until `exp`.
    pub fn record(&self, jti: impl Into<String>, exp: DateTime<Utc>) {
        let mut seen = self.seen.lock();
        seen.insert(jti.into(), exp);
        Self::enforce_capacity(&mut seen, self.max_entries);
    }

    /// Atomically admit a jti: returns true exactly once per jti within
    /// its validity window, under a single lock so concurrent callers
    /// cannot both win.
    pub fn admit(&self, jti: &str, exp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, e| *e >= now);
        if seen.contains_key(jti) {
            return false;
        }
        seen.insert(jti.to_string(), exp);
        Self::enforce_capacity(&mut seen, self.max_entries);
        true
    }

    /// Current entry count (after no cleanup).
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    fn enforce_capacity(seen: &mut HashMap<String, DateTime<Utc>>, max_entries: usize) {
        while seen.len() > max_entries {
            let oldest = seen
                .iter()
                .min_by_key(|(_, exp)| **exp)
                .map(|(jti, _)| jti.clone());
            match oldest {
                Some(jti) => {
                    debug!(jti = %jti, "replay cache evicting oldest-expiring entry");
                    seen.remove(&jti);
                }
                None => break,
            }
        }
    }
}
