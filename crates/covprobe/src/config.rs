//! Service Configuration
//!
//! The service runs in exactly one mode, chosen at construction. Every
//! configuration type is serde-friendly so a whole setup can live in a YAML
//! file:
//!
//! ```yaml
//! output_dir: target/covprobe
//! device:
//!   serial: emulator-5554
//! mode:
//!   kind: stream
//!   total: 62491
//!   tag: FING_SUPER_LOG
//! ```

use crate::bounded::DEFAULT_DEADLINE;
use crate::coverage::GrowthConfig;
use crate::device::{AdbDevice, DEFAULT_SETTLE_DELAY};
use crate::listener::{ListenerConfig, DEFAULT_RESTART_BACKOFF};
use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log tag emitted by the instrumented app
pub const DEFAULT_TAG: &str = "FING_SUPER_LOG";

/// Default local output directory
pub const DEFAULT_OUTPUT_DIR: &str = "target/covprobe";

/// Serialize a [`Duration`] as whole milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Write `d` as milliseconds
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    /// Read milliseconds into a [`Duration`]
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Stream mode: count methods from the live log against a known total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Instrumentable methods in the target
    pub total: u64,
    /// Log tag to listen on
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Pause before reopening an ended stream
    #[serde(default = "default_restart_backoff", with = "millis")]
    pub restart_backoff: Duration,
}

impl StreamConfig {
    /// Stream config for `total` methods on the default tag
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            tag: DEFAULT_TAG.to_string(),
            restart_backoff: DEFAULT_RESTART_BACKOFF,
        }
    }

    /// Set the log tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Set the restart backoff
    #[must_use]
    pub const fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Listener settings derived from this config
    #[must_use]
    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig::new(self.tag.clone()).with_restart_backoff(self.restart_backoff)
    }
}

/// Snapshot mode: pull and analyze execution data on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Local directory the snapshot is pulled into
    pub output_dir: PathBuf,
    /// Snapshot file name requested from the device
    pub snapshot_file_name: String,
    /// Directory on the device holding the snapshot
    pub remote_snapshot_path: String,
    /// Local class files the snapshot is analyzed against
    pub analyzable_units_path: PathBuf,
    /// Path to `jacococli.jar`
    pub jacoco_cli: PathBuf,
    /// `java` executable; `java` on `PATH` when unset
    #[serde(default)]
    pub java: Option<PathBuf>,
    /// Longest wait for a fresh snapshot
    #[serde(default = "default_deadline", with = "millis")]
    pub deadline: Duration,
}

impl SnapshotConfig {
    /// Snapshot config with the default deadline
    #[must_use]
    pub fn new(
        output_dir: impl Into<PathBuf>,
        snapshot_file_name: impl Into<String>,
        remote_snapshot_path: impl Into<String>,
        analyzable_units_path: impl Into<PathBuf>,
        jacoco_cli: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            snapshot_file_name: snapshot_file_name.into(),
            remote_snapshot_path: remote_snapshot_path.into(),
            analyzable_units_path: analyzable_units_path.into(),
            jacoco_cli: jacoco_cli.into(),
            java: None,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Set the wait deadline
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Which coverage signal the service consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceMode {
    /// Live log counting
    Stream(StreamConfig),
    /// Snapshot pulling with a bounded wait
    Snapshot(SnapshotConfig),
    /// No coverage source; every reading is the unavailable sentinel
    Disabled,
}

impl ServiceMode {
    /// Short mode name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Snapshot(_) => "snapshot",
            Self::Disabled => "disabled",
        }
    }
}

/// How to reach the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// `adb` executable
    pub adb: PathBuf,
    /// Device serial; the only attached device when unset
    pub serial: Option<String>,
    /// Delay after a snapshot broadcast
    #[serde(with = "millis")]
    pub settle_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb: PathBuf::from("adb"),
            serial: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl DeviceConfig {
    /// Build the `adb` device this config describes
    #[must_use]
    pub fn adb_device(&self) -> AdbDevice {
        let device = AdbDevice::new()
            .with_adb(self.adb.clone())
            .with_settle_delay(self.settle_delay);
        match &self.serial {
            Some(serial) => device.with_serial(serial.clone()),
            None => device,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageServiceConfig {
    /// Directory holding `codecoverage.txt`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Device connection
    #[serde(default)]
    pub device: DeviceConfig,
    /// Coverage source
    pub mode: ServiceMode,
    /// Stagnation detection
    #[serde(default)]
    pub growth: GrowthConfig,
}

impl CoverageServiceConfig {
    /// Config for `mode` with defaults elsewhere
    #[must_use]
    pub fn new(mode: ServiceMode) -> Self {
        Self {
            output_dir: default_output_dir(),
            device: DeviceConfig::default(),
            mode,
            growth: GrowthConfig::default(),
        }
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the device connection
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> CovResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: &Path) -> CovResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> CovResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject configurations that cannot produce a percentage
    pub fn validate(&self) -> CovResult<()> {
        match &self.mode {
            ServiceMode::Stream(stream) => {
                if stream.total == 0 {
                    return Err(CovError::misconfigured("stream mode needs a positive total"));
                }
                if stream.tag.trim().is_empty() {
                    return Err(CovError::misconfigured("stream mode needs a log tag"));
                }
            }
            ServiceMode::Snapshot(snapshot) => {
                if snapshot.snapshot_file_name.trim().is_empty() {
                    return Err(CovError::misconfigured(
                        "snapshot mode needs a snapshot file name",
                    ));
                }
            }
            ServiceMode::Disabled => {}
        }
        Ok(())
    }
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_restart_backoff() -> Duration {
    DEFAULT_RESTART_BACKOFF
}

fn default_deadline() -> Duration {
    DEFAULT_DEADLINE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}
