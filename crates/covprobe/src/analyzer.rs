//! Snapshot Analyzers
//!
//! Turns a pulled execution-data snapshot plus the local class files into
//! per-unit method counters. [`JacocoCliAnalyzer`] delegates the binary
//! format to `jacococli.jar` and reads back its CSV report.

use crate::coverage::{UnitCoverage, UnitVisitor};
use crate::result::{CovError, CovResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Analyzes one snapshot, visiting every analyzable unit
pub trait SnapshotAnalyzer: Send + Sync + fmt::Debug {
    /// Scan `snapshot` against `units`, returning the number of units visited
    fn analyze(
        &self,
        snapshot: &Path,
        units: &Path,
        visitor: &mut dyn UnitVisitor,
    ) -> CovResult<usize>;
}

/// Runs `java -jar jacococli.jar report ... --csv` and parses the result
#[derive(Debug, Clone)]
pub struct JacocoCliAnalyzer {
    java: PathBuf,
    cli_jar: PathBuf,
}

impl JacocoCliAnalyzer {
    /// Analyzer using `java` from `PATH`
    #[must_use]
    pub fn new(cli_jar: impl Into<PathBuf>) -> Self {
        Self {
            java: PathBuf::from("java"),
            cli_jar: cli_jar.into(),
        }
    }

    /// Use a specific `java` executable
    #[must_use]
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    /// Arguments passed to `java` for one report
    #[must_use]
    pub fn report_args(&self, snapshot: &Path, units: &Path, csv: &Path) -> Vec<String> {
        vec![
            "-jar".to_string(),
            self.cli_jar.to_string_lossy().to_string(),
            "report".to_string(),
            snapshot.to_string_lossy().to_string(),
            "--classfiles".to_string(),
            units.to_string_lossy().to_string(),
            "--csv".to_string(),
            csv.to_string_lossy().to_string(),
            "--quiet".to_string(),
        ]
    }
}

impl SnapshotAnalyzer for JacocoCliAnalyzer {
    fn analyze(
        &self,
        snapshot: &Path,
        units: &Path,
        visitor: &mut dyn UnitVisitor,
    ) -> CovResult<usize> {
        let csv = snapshot.with_extension("csv");
        let args = self.report_args(snapshot, units, &csv);
        let output = Command::new(&self.java)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                CovError::snapshot_unavailable(format!("failed to execute jacococli: {e}"))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CovError::snapshot_unavailable(format!(
                "jacococli exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let report = std::fs::read_to_string(&csv).map_err(|e| {
            CovError::snapshot_unavailable(format!("cannot read {}: {e}", csv.display()))
        })?;
        let parsed = parse_jacoco_csv(&report)?;
        for unit in &parsed {
            visitor.visit(unit);
        }
        Ok(parsed.len())
    }
}

fn column(header: &[&str], name: &str) -> CovResult<usize> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| CovError::snapshot_unavailable(format!("CSV report lacks {name} column")))
}

fn count_field(fields: &[&str], idx: usize, line_no: usize) -> CovResult<u64> {
    fields
        .get(idx)
        .and_then(|f| f.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            CovError::snapshot_unavailable(format!("bad method counter on CSV line {line_no}"))
        })
}

/// Parse a JaCoCo CSV report into per-class method counters
///
/// Uses the `PACKAGE`, `CLASS`, `METHOD_MISSED`, and `METHOD_COVERED`
/// columns; blank lines are skipped.
pub fn parse_jacoco_csv(report: &str) -> CovResult<Vec<UnitCoverage>> {
    let mut lines = report.lines().enumerate();
    let header: Vec<&str> = match lines.next() {
        Some((_, h)) => h.split(',').collect(),
        None => return Err(CovError::snapshot_unavailable("empty CSV report")),
    };
    let package_col = column(&header, "PACKAGE")?;
    let class_col = column(&header, "CLASS")?;
    let missed_col = column(&header, "METHOD_MISSED")?;
    let covered_col = column(&header, "METHOD_COVERED")?;

    let mut units = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let line_no = idx + 1;
        let package = fields.get(package_col).copied().unwrap_or("").trim();
        let class = fields.get(class_col).copied().unwrap_or("").trim();
        let name = if package.is_empty() {
            class.to_string()
        } else {
            format!("{package}.{class}")
        };
        let missed = count_field(&fields, missed_col, line_no)?;
        let covered = count_field(&fields, covered_col, line_no)?;
        units.push(UnitCoverage::new(name, covered, missed));
    }
    Ok(units)
}
