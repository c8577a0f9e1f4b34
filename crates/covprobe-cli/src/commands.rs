//! CLI command definitions using clap

use crate::error::{CliError, CliResult};
use clap::{Args, Parser, Subcommand, ValueEnum};
use covprobe::config::{DEFAULT_OUTPUT_DIR, DEFAULT_TAG};
use covprobe::{DeviceConfig, SnapshotConfig, StreamConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Covprobe: live method coverage of an Android app under automated exploration
#[derive(Parser, Debug)]
#[command(name = "covprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Count methods from the live device log
    Stream(StreamArgs),

    /// Pull and analyze coverage snapshots from the device
    Snapshot(SnapshotArgs),

    /// Poll coverage using a YAML configuration file
    Run(RunArgs),

    /// Summarize a JaCoCo CSV report without a device
    Analyze(AnalyzeArgs),

    /// Validate a configuration file or print a template
    Config(ConfigArgs),
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Reading output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `[mode] pct%` lines
    #[default]
    Text,
    /// One JSON object per reading
    Json,
}

/// How often and how long to poll
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Milliseconds between readings
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Number of readings to take (0 = until interrupted)
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u64,

    /// Reading output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Also report whether coverage growth has stagnated
    #[arg(long)]
    pub growth: bool,

    /// Milliseconds to wait for the listener to stop on exit
    #[arg(long, default_value = "2000")]
    pub shutdown_ms: u64,
}

impl PollArgs {
    /// Pause between readings
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Shutdown wait
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }

    /// Reject polling forever with no pause between readings
    pub fn validate(&self) -> CliResult<()> {
        if self.count == 0 && self.interval_ms == 0 {
            return Err(CliError::invalid_argument(
                "--count 0 polls forever and needs a positive --interval-ms",
            ));
        }
        Ok(())
    }
}

/// How to reach the device
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// `adb` executable
    #[arg(long, default_value = "adb", env = "COVPROBE_ADB")]
    pub adb: PathBuf,

    /// Device serial
    #[arg(short, long, env = "ANDROID_SERIAL")]
    pub serial: Option<String>,
}

impl DeviceArgs {
    /// Device config for these arguments
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            adb: self.adb.clone(),
            serial: self.serial.clone(),
            ..DeviceConfig::default()
        }
    }
}

/// Arguments for the stream command
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Instrumentable methods in the app
    #[arg(long)]
    pub total: u64,

    /// Log tag the app writes method lines under
    #[arg(long, default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Milliseconds to wait before reopening an ended log stream
    #[arg(long, default_value = "500")]
    pub restart_backoff_ms: u64,

    /// Directory for codecoverage.txt
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Device connection
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Polling
    #[command(flatten)]
    pub poll: PollArgs,
}

impl StreamArgs {
    /// Stream config for these arguments
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.total)
            .with_tag(self.tag.clone())
            .with_restart_backoff(Duration::from_millis(self.restart_backoff_ms))
    }
}

/// Arguments for the snapshot command
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Snapshot file name requested from the app
    #[arg(long, default_value = "coverage.ec")]
    pub file_name: String,

    /// Directory on the device holding the snapshot
    #[arg(long, default_value = "/sdcard")]
    pub remote_path: String,

    /// Compiled classes the snapshot is analyzed against
    #[arg(long)]
    pub classes: PathBuf,

    /// Path to jacococli.jar
    #[arg(long, env = "JACOCO_CLI")]
    pub jacoco_cli: PathBuf,

    /// `java` executable
    #[arg(long)]
    pub java: Option<PathBuf>,

    /// Milliseconds to wait for a fresh snapshot
    #[arg(long, default_value = "1000")]
    pub deadline_ms: u64,

    /// Directory for pulled snapshots and codecoverage.txt
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Device connection
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Polling
    #[command(flatten)]
    pub poll: PollArgs,
}

impl SnapshotArgs {
    /// Snapshot config for these arguments
    #[must_use]
    pub fn snapshot_config(&self) -> SnapshotConfig {
        let mut config = SnapshotConfig::new(
            self.output.clone(),
            self.file_name.clone(),
            self.remote_path.clone(),
            self.classes.clone(),
            self.jacoco_cli.clone(),
        )
        .with_deadline(Duration::from_millis(self.deadline_ms));
        config.java.clone_from(&self.java);
        config
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Polling
    #[command(flatten)]
    pub poll: PollArgs,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// JaCoCo CSV report
    pub report: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration file to validate; prints a template when omitted
    pub file: Option<PathBuf>,

    /// Template mode when no file is given
    #[arg(long, default_value = "stream")]
    pub template: TemplateMode,
}

/// Which template `config` prints
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TemplateMode {
    /// Live log counting
    #[default]
    Stream,
    /// Snapshot pulling
    Snapshot,
    /// No coverage source
    Disabled,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_stream_args_build_config() {
        let cli = Cli::try_parse_from([
            "covprobe",
            "stream",
            "--total",
            "100",
            "--tag",
            "T",
            "--restart-backoff-ms",
            "20",
        ])
        .unwrap();
        match cli.command {
            Commands::Stream(args) => {
                let config = args.stream_config();
                assert_eq!(config.total, 100);
                assert_eq!(config.tag, "T");
                assert_eq!(config.restart_backoff, Duration::from_millis(20));
                assert_eq!(args.poll.count, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_args_build_config() {
        let cli = Cli::try_parse_from([
            "covprobe",
            "snapshot",
            "--classes",
            "app/classes",
            "--jacoco-cli",
            "jacococli.jar",
            "--deadline-ms",
            "1300",
            "--java",
            "/opt/java",
        ])
        .unwrap();
        match cli.command {
            Commands::Snapshot(args) => {
                let config = args.snapshot_config();
                assert_eq!(config.snapshot_file_name, "coverage.ec");
                assert_eq!(config.deadline, Duration::from_millis(1300));
                assert_eq!(config.java, Some(PathBuf::from("/opt/java")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_verbose_is_counted_globally() {
        let cli = Cli::try_parse_from(["covprobe", "config", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_endless_polling_needs_an_interval() {
        let parse = |args: &[&str]| match Cli::try_parse_from(args).unwrap().command {
            Commands::Run(run) => run.poll,
            other => panic!("unexpected command {other:?}"),
        };
        let endless = parse(&["covprobe", "run", "-c", "c.yaml", "-n", "0", "--interval-ms", "0"]);
        assert!(matches!(
            endless.validate(),
            Err(CliError::InvalidArgument { .. })
        ));
        let bounded = parse(&["covprobe", "run", "-c", "c.yaml", "-n", "3", "--interval-ms", "0"]);
        assert!(bounded.validate().is_ok());
        let paced = parse(&["covprobe", "run", "-c", "c.yaml", "-n", "0"]);
        assert!(paced.validate().is_ok());
    }

    #[test]
    fn test_stream_requires_total() {
        assert!(Cli::try_parse_from(["covprobe", "stream"]).is_err());
    }
}
