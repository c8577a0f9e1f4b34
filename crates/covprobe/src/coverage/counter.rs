//! Idempotent Component Counter
//!
//! Each distinct `(kind, identifier)` pair contributes at most once to the
//! per-kind count, no matter how often the log stream repeats it. The
//! membership test, insert, and increment happen under one lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Component kind used for executed methods
pub const METHODS: &str = "methods";

#[derive(Debug, Default)]
struct CounterState {
    seen: HashSet<(String, String)>,
    counts: BTreeMap<String, u64>,
}

/// Shared, thread-safe counter of distinct covered components
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct ComponentCounter {
    state: Arc<Mutex<CounterState>>,
}

impl ComponentCounter {
    /// Create an empty counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a component, returning `true` if it had not been seen before
    pub fn record(&self, kind: &str, identifier: &str) -> bool {
        let mut state = self.lock();
        let key = (kind.to_string(), identifier.to_string());
        if !state.seen.insert(key) {
            return false;
        }
        *state.counts.entry(kind.to_string()).or_insert(0) += 1;
        true
    }

    /// Record an executed method
    pub fn record_method(&self, method: &str) -> bool {
        self.record(METHODS, method)
    }

    /// Distinct identifiers seen for a kind
    #[must_use]
    pub fn count(&self, kind: &str) -> u64 {
        self.lock().counts.get(kind).copied().unwrap_or(0)
    }

    /// Distinct methods seen so far
    #[must_use]
    pub fn method_count(&self) -> u64 {
        self.count(METHODS)
    }

    /// Per-kind counts
    #[must_use]
    pub fn summary(&self) -> BTreeMap<String, u64> {
        self.lock().counts.clone()
    }

    /// Total distinct keys across all kinds
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.lock().seen.len()
    }
}
