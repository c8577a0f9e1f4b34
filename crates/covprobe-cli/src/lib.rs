//! Covprobe CLI Library
//!
//! Command-line front end for the Covprobe coverage service: poll a device
//! in stream or snapshot mode, summarize offline reports, and manage YAML
//! configuration.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
mod runner;

pub use commands::{
    AnalyzeArgs, Cli, Commands, ConfigArgs, DeviceArgs, LogFormat, OutputFormat, PollArgs,
    RunArgs, SnapshotArgs, StreamArgs, TemplateMode,
};
pub use config::{CliConfig, Verbosity};
pub use error::{CliError, CliResult};
pub use runner::{poll, AnalyzeReport, ReadingReport};
