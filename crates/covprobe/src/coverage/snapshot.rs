//! Snapshot Aggregator
//!
//! Sums method-level covered/missed/total counters over every analyzable
//! unit of one execution-data snapshot.

use crate::analyzer::SnapshotAnalyzer;
use crate::device::{remote_join, TargetDevice};
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Method counters of one analyzable unit (typically a class)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCoverage {
    /// Unit name, e.g. `com/example/Foo`
    pub name: String,
    /// Methods executed at least once
    pub covered: u64,
    /// Methods never executed
    pub missed: u64,
    /// All methods in the unit
    pub total: u64,
}

impl UnitCoverage {
    /// Unit whose total is `covered + missed`
    #[must_use]
    pub fn new(name: impl Into<String>, covered: u64, missed: u64) -> Self {
        Self {
            name: name.into(),
            covered,
            missed,
            total: covered + missed,
        }
    }
}

/// Receives each analyzed unit of a snapshot scan
pub trait UnitVisitor {
    /// Called once per analyzed unit
    fn visit(&mut self, unit: &UnitCoverage);
}

/// Accumulated counters of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTotals {
    /// Covered methods across all units
    pub covered: u64,
    /// Missed methods across all units
    pub missed: u64,
    /// All methods across all units
    pub total: u64,
    /// Units visited
    pub units: u64,
}

impl SnapshotTotals {
    /// `covered / total`, or `None` when nothing was analyzed
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.covered as f64 / self.total as f64)
    }
}

/// Where a snapshot comes from and how it is analyzed
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    /// Device that produces the snapshot
    pub device: Arc<dyn TargetDevice>,
    /// Analyzer for the pulled file
    pub analyzer: Arc<dyn SnapshotAnalyzer>,
    /// Local directory the snapshot is pulled into
    pub output_dir: PathBuf,
    /// Snapshot file name requested from the device
    pub snapshot_file_name: String,
    /// Directory on the device holding the snapshot
    pub remote_snapshot_path: String,
    /// Local class files to analyze against
    pub analyzable_units_path: PathBuf,
}

impl SnapshotSource {
    /// Local path the snapshot is pulled to
    #[must_use]
    pub fn local_snapshot_path(&self) -> PathBuf {
        self.output_dir.join(&self.snapshot_file_name)
    }

    /// Local path for the snapshot of task `seq`, e.g. `coverage-7.ec`
    ///
    /// Overlapping tasks each pull into their own file.
    #[must_use]
    pub fn task_snapshot_path(&self, seq: u64) -> PathBuf {
        let name = Path::new(&self.snapshot_file_name);
        let stem = name
            .file_stem()
            .map_or_else(|| self.snapshot_file_name.clone(), |s| s.to_string_lossy().into_owned());
        let file = match name.extension() {
            Some(ext) => format!("{stem}-{seq}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{seq}"),
        };
        self.output_dir.join(file)
    }

    /// Device path the snapshot is pulled from
    #[must_use]
    pub fn remote_snapshot_file(&self) -> String {
        remote_join(&self.remote_snapshot_path, &self.snapshot_file_name)
    }
}

/// Accumulates [`SnapshotTotals`] while a snapshot is scanned
#[derive(Debug, Default)]
pub struct SnapshotAggregator {
    totals: SnapshotTotals,
}

impl UnitVisitor for SnapshotAggregator {
    fn visit(&mut self, unit: &UnitCoverage) {
        self.totals.covered += unit.covered;
        self.totals.missed += unit.missed;
        self.totals.total += unit.total;
        self.totals.units += 1;
    }
}

impl SnapshotAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the running totals
    pub fn reset(&mut self) {
        self.totals = SnapshotTotals::default();
    }

    /// Totals accumulated so far
    #[must_use]
    pub fn totals(&self) -> SnapshotTotals {
        self.totals
    }

    /// `covered / total`, or `None` when nothing was analyzed
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        self.totals.ratio()
    }

    /// Trigger, pull, and analyze a fresh snapshot, returning the covered fraction
    ///
    /// A snapshot with no analyzable methods yields `0.0`.
    pub fn get_method_coverage(&mut self, source: &SnapshotSource) -> CovResult<f64> {
        self.get_method_coverage_at(source, &source.local_snapshot_path())
    }

    /// Like [`get_method_coverage`](Self::get_method_coverage), pulling into `local`
    pub fn get_method_coverage_at(
        &mut self,
        source: &SnapshotSource,
        local: &Path,
    ) -> CovResult<f64> {
        self.reset();

        source
            .device
            .broadcast_snapshot(&source.snapshot_file_name)
            .map_err(|e| CovError::snapshot_unavailable(format!("broadcast failed: {e}")))?;

        let remote = source.remote_snapshot_file();
        source
            .device
            .pull(&remote, local)
            .map_err(|e| CovError::snapshot_unavailable(format!("pull of {remote} failed: {e}")))?;

        if !local.exists() {
            return Err(CovError::snapshot_unavailable(format!(
                "{} missing after pull",
                local.display()
            )));
        }

        let units = source
            .analyzer
            .analyze(local, &source.analyzable_units_path, self)?;

        let totals = self.totals;
        tracing::debug!(
            units,
            covered = totals.covered,
            missed = totals.missed,
            total = totals.total,
            "snapshot aggregated"
        );
        Ok(totals.ratio().unwrap_or_else(|| {
            tracing::warn!(path = %local.display(), "snapshot contained no analyzable methods");
            0.0
        }))
    }
}
