//! In-memory device and analyzer doubles shared by the unit tests.

use crate::analyzer::SnapshotAnalyzer;
use crate::coverage::{UnitCoverage, UnitVisitor};
use crate::device::{LogStream, TargetDevice};
use crate::result::{CovError, CovResult};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct FakeState {
    sessions: VecDeque<Vec<String>>,
    clears: usize,
    opens: usize,
    broadcasts: Vec<String>,
    pulls: Vec<(String, PathBuf)>,
    fail_pull: bool,
    fail_broadcast: bool,
    fail_clear: bool,
}

/// Device whose log streams are scripted sessions; each open consumes one
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn read<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
        f(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Queue one log session; the stream ends after these lines
    pub fn session(self, lines: &[&str]) -> Self {
        self.with_state(|s| {
            s.sessions
                .push_back(lines.iter().map(|l| (*l).to_string()).collect());
        });
        self
    }

    pub fn failing_pull(self) -> Self {
        self.with_state(|s| s.fail_pull = true);
        self
    }

    pub fn failing_broadcast(self) -> Self {
        self.with_state(|s| s.fail_broadcast = true);
        self
    }

    pub fn failing_clear(self) -> Self {
        self.with_state(|s| s.fail_clear = true);
        self
    }

    pub fn clears(&self) -> usize {
        self.read(|s| s.clears)
    }

    pub fn opens(&self) -> usize {
        self.read(|s| s.opens)
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.read(|s| s.broadcasts.clone())
    }

    pub fn pulls(&self) -> Vec<(String, PathBuf)> {
        self.read(|s| s.pulls.clone())
    }
}

impl TargetDevice for FakeDevice {
    fn clear_log(&self) -> CovResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.clears += 1;
        if state.fail_clear {
            return Err(CovError::device("logcat -c", "device offline"));
        }
        Ok(())
    }

    fn open_log_stream(&self, tag: &str) -> CovResult<LogStream> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.opens += 1;
        match state.sessions.pop_front() {
            Some(lines) => {
                let mut text = lines.join("\n");
                text.push('\n');
                Ok(Box::new(Cursor::new(text.into_bytes())))
            }
            None => Err(CovError::device(
                format!("logcat -s {tag}"),
                "no more sessions",
            )),
        }
    }

    fn broadcast_snapshot(&self, file_name: &str) -> CovResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fail_broadcast {
            return Err(CovError::device("am broadcast", "device offline"));
        }
        state.broadcasts.push(file_name.to_string());
        Ok(())
    }

    fn pull(&self, remote: &str, local: &Path) -> CovResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fail_pull {
            return Err(CovError::device("pull", "remote object does not exist"));
        }
        state.pulls.push((remote.to_string(), local.to_path_buf()));
        std::fs::write(local, format!("exec-{}", state.pulls.len()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Step {
    delay: Duration,
    units: Option<Vec<UnitCoverage>>,
}

/// Analyzer returning scripted units, optionally after a delay
///
/// Queued steps are consumed in call order; afterwards the fallback repeats.
#[derive(Debug)]
pub struct FixedAnalyzer {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
    reads: Mutex<Vec<(String, String)>>,
}

impl FixedAnalyzer {
    pub fn new(units: Vec<UnitCoverage>) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Step {
                delay: Duration::ZERO,
                units: Some(units),
            },
            calls: AtomicUsize::new(0),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let mut analyzer = Self::new(Vec::new());
        analyzer.fallback.units = None;
        analyzer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.fallback.delay = delay;
        self
    }

    /// Queue a step; `None` units make that call fail
    pub fn then(self, delay: Duration, units: Option<Vec<UnitCoverage>>) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Step { delay, units });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot contents seen before and after each call's delay
    pub fn reads(&self) -> Vec<(String, String)> {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotAnalyzer for FixedAnalyzer {
    fn analyze(
        &self,
        snapshot: &Path,
        _units: &Path,
        visitor: &mut dyn UnitVisitor,
    ) -> CovResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let before = std::fs::read_to_string(snapshot).unwrap_or_default();
        std::thread::sleep(step.delay);
        let after = std::fs::read_to_string(snapshot).unwrap_or_default();
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((before, after));
        let units = step
            .units
            .ok_or_else(|| CovError::snapshot_unavailable("scripted analysis failure"))?;
        for unit in &units {
            visitor.visit(unit);
        }
        Ok(units.len())
    }
}

/// One unit with the given covered/total method counts
pub fn units_with(covered: u64, total: u64) -> Vec<UnitCoverage> {
    vec![UnitCoverage::new("Fixture", covered, total - covered)]
}
