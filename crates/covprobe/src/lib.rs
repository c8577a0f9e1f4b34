//! Covprobe: live method-coverage estimation for automated UI exploration
//!
//! An exploration driver asks for "how much of the app have we reached?"
//! many times per minute. Covprobe answers from one of two signals:
//!
//! - **stream**: the instrumented app logs `METHOD=<signature>` for every
//!   method it enters; a background listener tails the device log and counts
//!   distinct methods against a known total.
//! - **snapshot**: the app dumps an execution-data file on request; each
//!   reading pulls and analyzes it, bounded by a deadline so a slow device
//!   never stalls the driver.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       COVPROBE Architecture                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌────────────────┐   ┌──────────────────┐     │
//! │  │ TargetDevice│──►│ StreamListener │──►│ ComponentCounter │     │
//! │  │   (adb)     │   └────────────────┘   └────────┬─────────┘     │
//! │  │             │                                 ▼               │
//! │  │             │   ┌────────────────────┐  ┌──────────────┐      │
//! │  │             │──►│ BoundedSnapshot    │  │ RateComputer │      │
//! │  └─────────────┘   │ Request            │  └──────┬───────┘      │
//! │                    └─────────┬──────────┘         │              │
//! │                              ▼                    ▼              │
//! │                    ┌──────────────────────────────────────┐      │
//! │                    │ CoverageService::get_coverage() -> % │      │
//! │                    └──────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use covprobe::{CoverageService, CoverageServiceConfig, ServiceMode, StreamConfig};
//!
//! let config = CoverageServiceConfig::new(ServiceMode::Stream(StreamConfig::new(62_491)));
//! let service = CoverageService::new(config)?;
//! let pct = service.get_coverage();
//! println!("covered {pct:.2}%");
//! # Ok::<(), covprobe::CovError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// External analysis of snapshot files
pub mod analyzer;
/// Deadline-bounded snapshot requests
pub mod bounded;
/// Serde configuration for every mode
pub mod config;
/// Parsing, counting, rates, snapshot aggregation, and growth tracking
#[allow(clippy::cast_precision_loss)]
pub mod coverage;
/// Device access over `adb`
pub mod device;
/// Restartable log listener
pub mod listener;
/// Error types
pub mod result;
/// Mode-selecting coverage facade
pub mod service;
/// Append-only `codecoverage.txt` writer
pub mod sink;

#[cfg(test)]
mod testing;

pub use analyzer::{parse_jacoco_csv, JacocoCliAnalyzer, SnapshotAnalyzer};
pub use bounded::{BoundedOutcome, BoundedSnapshotRequest, KnownCoverage, LastKnownCoverage};
pub use config::{CoverageServiceConfig, DeviceConfig, ServiceMode, SnapshotConfig, StreamConfig};
pub use coverage::{
    ComponentCounter, GrowthConfig, GrowthMonitor, LogLine, RateComputer, RateSample,
    SnapshotAggregator, SnapshotSource, UnitCoverage, UnitVisitor,
};
pub use device::{AdbDevice, TargetDevice};
pub use listener::{ListenerConfig, ListenerState, StreamListener};
pub use result::{CovError, CovResult};
pub use service::{CoverageReading, CoverageService, UNAVAILABLE_COVERAGE};
pub use sink::CoverageSink;
