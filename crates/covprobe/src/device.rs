//! Target Device Adapter
//!
//! Commands issued against the device under test: clearing and streaming
//! its log, asking the on-device agent to dump a coverage snapshot, and
//! pulling files back to the host. [`AdbDevice`] shells out to `adb`.

use crate::result::{CovError, CovResult};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

/// Broadcast action understood by the on-device coverage agent
pub const COLLECT_COVERAGE_ACTION: &str = "com.llmdroid.jacoco.COLLECT_COVERAGE";

/// Delay after a snapshot broadcast before the file is pulled
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Line stream read from the device log
pub type LogStream = Box<dyn BufRead + Send>;

/// Side-effecting operations on the device under test
pub trait TargetDevice: Send + Sync + fmt::Debug {
    /// Drop whatever the device log has buffered
    fn clear_log(&self) -> CovResult<()>;

    /// Open a live log stream filtered to `tag`
    fn open_log_stream(&self, tag: &str) -> CovResult<LogStream>;

    /// Ask the device to write a coverage snapshot named `file_name`
    fn broadcast_snapshot(&self, file_name: &str) -> CovResult<()>;

    /// Copy `remote` from the device to `local`
    fn pull(&self, remote: &str, local: &Path) -> CovResult<()>;
}

/// `adb`-backed device
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: PathBuf,
    serial: Option<String>,
    settle_delay: Duration,
}

impl Default for AdbDevice {
    fn default() -> Self {
        Self {
            adb: PathBuf::from("adb"),
            serial: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl AdbDevice {
    /// Device reachable through `adb` on `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a specific device serial (`adb -s`)
    #[must_use]
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        self.serial = if serial.is_empty() { None } else { Some(serial) };
        self
    }

    /// Use a specific `adb` executable
    #[must_use]
    pub fn with_adb(mut self, adb: impl Into<PathBuf>) -> Self {
        self.adb = adb.into();
        self
    }

    /// Delay after broadcasting before the snapshot is pulled
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Full argument list for an adb invocation, including `-s serial`
    #[must_use]
    pub fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 2);
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(rest.iter().map(|s| (*s).to_string()));
        args
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.adb.display(), args.join(" "))
    }

    fn run(&self, rest: &[&str]) -> CovResult<()> {
        let args = self.args(rest);
        let line = self.command_line(&args);
        tracing::debug!(command = %line, "running device command");
        let output = Command::new(&self.adb)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| CovError::device(&line, format!("failed to execute: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CovError::device(
                &line,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

impl TargetDevice for AdbDevice {
    fn clear_log(&self) -> CovResult<()> {
        self.run(&["logcat", "-c"])
    }

    fn open_log_stream(&self, tag: &str) -> CovResult<LogStream> {
        let args = self.args(&["logcat", "-s", tag]);
        let line = self.command_line(&args);
        tracing::debug!(command = %line, "opening log stream");
        let mut child = Command::new(&self.adb)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CovError::device(&line, format!("failed to spawn: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CovError::device(&line, "stdout was not captured"))?;
        Ok(Box::new(ChildLines {
            child,
            reader: BufReader::new(stdout),
        }))
    }

    fn broadcast_snapshot(&self, file_name: &str) -> CovResult<()> {
        let quoted = format!("\"{file_name}\"");
        self.run(&[
            "shell",
            "am",
            "broadcast",
            "-a",
            COLLECT_COVERAGE_ACTION,
            "--es",
            "coverageFile",
            &quoted,
        ])?;
        std::thread::sleep(self.settle_delay);
        Ok(())
    }

    fn pull(&self, remote: &str, local: &Path) -> CovResult<()> {
        let local = local.to_string_lossy();
        self.run(&["pull", remote, &local])
    }
}

/// Stdout of a running `adb logcat`; the process is killed when dropped
struct ChildLines {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl Read for ChildLines {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for ChildLines {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
    }
}

impl Drop for ChildLines {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Join a remote directory and file name with a single `/`
#[must_use]
pub fn remote_join(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        return file_name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), file_name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_args_without_serial() {
        let device = AdbDevice::new();
        assert_eq!(device.args(&["logcat", "-c"]), vec!["logcat", "-c"]);
    }

    #[test]
    fn test_args_with_serial() {
        let device = AdbDevice::new().with_serial("emulator-5554");
        assert_eq!(
            device.args(&["logcat", "-s", "TAG"]),
            vec!["-s", "emulator-5554", "logcat", "-s", "TAG"]
        );
    }

    #[test]
    fn test_empty_serial_is_ignored() {
        let device = AdbDevice::new().with_serial("");
        assert_eq!(device.args(&["pull"]), vec!["pull"]);
    }

    #[test]
    fn test_missing_adb_reports_device_error() {
        let device = AdbDevice::new().with_adb("/nonexistent/covprobe-adb");
        let err = device.clear_log().unwrap_err();
        assert!(matches!(err, CovError::Device { .. }));
        assert!(err.to_string().contains("logcat -c"));
    }

    #[test]
    fn test_missing_adb_stream_fails_to_open() {
        let device = AdbDevice::new().with_adb("/nonexistent/covprobe-adb");
        assert!(device.open_log_stream("TAG").is_err());
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("/sdcard/", "cov.ec"), "/sdcard/cov.ec");
        assert_eq!(remote_join("/sdcard", "cov.ec"), "/sdcard/cov.ec");
        assert_eq!(remote_join("", "cov.ec"), "cov.ec");
    }
}
