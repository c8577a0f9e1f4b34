//! Bounded Snapshot Request
//!
//! Each request computes a fresh snapshot on its own thread and waits for it
//! at most a fixed deadline. A late result is not lost: the thread keeps
//! running and publishes into [`LastKnownCoverage`] when it finishes.
//!
//! Every task carries a sequence id. A result is only published when its id
//! is newer than the one already stored, so a slow task from an earlier call
//! cannot overwrite the result of a faster later call.

use crate::coverage::{SnapshotAggregator, SnapshotSource};
use crate::result::CovResult;
use crate::sink::CoverageSink;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default wait for a fresh snapshot
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// Coverage reported before any snapshot has completed
pub const INITIAL_COVERAGE: f64 = 0.00001;

/// Outcome of one bounded request; every variant carries the percentage returned
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundedOutcome {
    /// Snapshot finished within the deadline
    ///
    /// Carries the published value, which is a newer call's result when that
    /// call finished first, so it always agrees with the last known coverage.
    Fresh(f64),
    /// Deadline elapsed; value known before the call
    TimedOut(f64),
    /// Snapshot failed within the deadline; last known value
    Failed(f64),
}

impl BoundedOutcome {
    /// Percentage handed back to the caller
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::Fresh(v) | Self::TimedOut(v) | Self::Failed(v) => v,
        }
    }

    /// Whether the value comes from this call's own snapshot
    #[must_use]
    pub const fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Last completed coverage and the sequence id that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownCoverage {
    /// Percentage, 0-100
    pub percentage: f64,
    /// Sequence id of the producing task; 0 before any completion
    pub seq: u64,
}

/// Mutex-guarded last known coverage
#[derive(Debug)]
pub struct LastKnownCoverage {
    inner: Mutex<KnownCoverage>,
}

impl Default for LastKnownCoverage {
    fn default() -> Self {
        Self::new(INITIAL_COVERAGE)
    }
}

impl LastKnownCoverage {
    /// Seed with `initial`
    #[must_use]
    pub fn new(initial: f64) -> Self {
        Self {
            inner: Mutex::new(KnownCoverage {
                percentage: initial,
                seq: 0,
            }),
        }
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> KnownCoverage {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `percentage` if `seq` is newer than the stored one
    pub fn publish(&self, seq: u64, percentage: f64) -> bool {
        let mut known = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= known.seq {
            return false;
        }
        *known = KnownCoverage { percentage, seq };
        true
    }
}

/// Snapshot-mode coverage with a bounded wait per request
#[derive(Debug)]
pub struct BoundedSnapshotRequest {
    source: SnapshotSource,
    deadline: Duration,
    last_known: Arc<LastKnownCoverage>,
    next_seq: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    sink: Option<CoverageSink>,
}

impl BoundedSnapshotRequest {
    /// Requests against `source` waiting at most [`DEFAULT_DEADLINE`]
    #[must_use]
    pub fn new(source: SnapshotSource) -> Self {
        Self {
            source,
            deadline: DEFAULT_DEADLINE,
            last_known: Arc::new(LastKnownCoverage::default()),
            next_seq: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            sink: None,
        }
    }

    /// Set the wait deadline
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Persist every returned value to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: CoverageSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Compute a fresh snapshot, waiting at most the deadline for it
    pub fn get_coverage(&self) -> BoundedOutcome {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let before = self.last_known.get().percentage;

        let outcome = match self.spawn_task(seq) {
            Ok(rx) => match rx.recv_timeout(self.deadline) {
                Ok(Ok(percentage)) => {
                    tracing::info!(seq, "new coverage: {percentage:.5}%");
                    let known = self.last_known.get();
                    if known.seq > seq {
                        tracing::debug!(seq, newer = known.seq, "newer snapshot already published");
                    }
                    BoundedOutcome::Fresh(known.percentage)
                }
                Ok(Err(e)) => {
                    tracing::warn!(seq, error = %e, "snapshot failed; returning last known coverage");
                    BoundedOutcome::Failed(self.last_known.get().percentage)
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!(
                        seq,
                        deadline = ?self.deadline,
                        "coverage calculation took too long; returning previous coverage"
                    );
                    BoundedOutcome::TimedOut(before)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::error!(seq, "snapshot task exited without a result");
                    BoundedOutcome::Failed(self.last_known.get().percentage)
                }
            },
            Err(e) => {
                tracing::error!(seq, error = %e, "failed to spawn snapshot task");
                BoundedOutcome::Failed(before)
            }
        };

        if let Some(sink) = &self.sink {
            sink.record(&format!("{:.5}%", outcome.value()));
        }
        outcome
    }

    fn spawn_task(&self, seq: u64) -> CovResult<mpsc::Receiver<CovResult<f64>>> {
        let (tx, rx) = mpsc::channel();
        let source = self.source.clone();
        let last_known = Arc::clone(&self.last_known);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(format!("covprobe-snapshot-{seq}"))
            .spawn(move || {
                let local = source.task_snapshot_path(seq);
                let mut aggregator = SnapshotAggregator::new();
                let result = aggregator
                    .get_method_coverage_at(&source, &local)
                    .map(|fraction| fraction * 100.0);
                remove_task_files(&local);
                if let Ok(percentage) = &result {
                    if last_known.publish(seq, *percentage) {
                        tracing::debug!(seq, percentage, "published snapshot coverage");
                    } else {
                        tracing::debug!(seq, percentage, "discarded stale snapshot result");
                    }
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
                // The caller may have stopped waiting; the result is already published.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(rx)
    }

    /// Last completed coverage
    #[must_use]
    pub fn last_known(&self) -> KnownCoverage {
        self.last_known.get()
    }

    /// Snapshot tasks still running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait deadline
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Delete a task's pulled snapshot and the report derived from it
fn remove_task_files(local: &Path) {
    for path in [local.to_path_buf(), local.with_extension("csv")] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove snapshot file"),
        }
    }
}
