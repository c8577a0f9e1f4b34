//! Coverage Sink
//!
//! Append-only text file recording every coverage reading. Creating a sink
//! truncates the file and writes a two-line header.

use crate::result::CovResult;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// File name used inside the output directory
pub const SINK_FILE_NAME: &str = "codecoverage.txt";

/// First header line of a fresh sink
pub const SINK_HEADER: &str = "code coverage";

#[derive(Debug)]
struct SinkInner {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Shared handle to the coverage sink file
#[derive(Debug, Clone)]
pub struct CoverageSink {
    inner: Arc<SinkInner>,
}

impl CoverageSink {
    /// Create (or truncate) `codecoverage.txt` inside `dir`
    pub fn create(dir: &Path) -> CovResult<Self> {
        fs::create_dir_all(dir)?;
        Self::create_at(dir.join(SINK_FILE_NAME))
    }

    /// Create (or truncate) a sink at an explicit path
    pub fn create_at(path: impl Into<PathBuf>) -> CovResult<Self> {
        let path = path.into();
        let mut file = File::create(&path)?;
        let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{SINK_HEADER}")?;
        writeln!(file, "start time: {started}")?;
        Ok(Self {
            inner: Arc::new(SinkInner {
                path,
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Append one line
    pub fn append(&self, line: &str) -> CovResult<()> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new().append(true).open(&self.inner.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Append one line, logging instead of returning failures
    pub fn record(&self, line: &str) {
        if let Err(e) = self.append(line) {
            tracing::warn!(path = %self.inner.path.display(), error = %e, "failed to persist coverage line");
        }
    }

    /// Path of the sink file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_header() {
        let dir = TempDir::new().unwrap();
        let sink = CoverageSink::create(dir.path()).unwrap();
        let content = fs::read_to_string(sink.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("code coverage"));
        assert!(lines.next().unwrap().starts_with("start time: "));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = TempDir::new().unwrap();
        let sink = CoverageSink::create(dir.path()).unwrap();
        sink.append("old reading").unwrap();
        let sink = CoverageSink::create(dir.path()).unwrap();
        let content = fs::read_to_string(sink.path()).unwrap();
        assert!(!content.contains("old reading"));
    }

    #[test]
    fn test_append_adds_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = CoverageSink::create(dir.path()).unwrap();
        sink.append("1.00000%").unwrap();
        sink.record("2.00000%");
        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "1.00000%");
        assert_eq!(lines[3], "2.00000%");
    }

    #[test]
    fn test_create_makes_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let sink = CoverageSink::create(&nested).unwrap();
        assert!(sink.path().exists());
        assert_eq!(sink.path().file_name().unwrap(), SINK_FILE_NAME);
    }

    #[test]
    fn test_concurrent_appends_keep_whole_lines() {
        let dir = TempDir::new().unwrap();
        let sink = CoverageSink::create(dir.path()).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sink.record(&format!("t{t} line {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let content = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 2 + 100);
        assert!(content.lines().skip(2).all(|l| l.starts_with('t')));
    }
}
