//! Coverage Service
//!
//! Facade chosen once at construction to run in stream mode, snapshot mode,
//! or disabled. Callers only ever see `get_coverage()`; nothing here returns
//! an error once the service exists. Misconfiguration degrades to
//! [`UNAVAILABLE_COVERAGE`] with a logged error.

use crate::analyzer::{JacocoCliAnalyzer, SnapshotAnalyzer};
use crate::bounded::{BoundedOutcome, BoundedSnapshotRequest, KnownCoverage};
use crate::config::{CoverageServiceConfig, ServiceMode, SnapshotConfig, StreamConfig};
use crate::coverage::{ComponentCounter, GrowthMonitor, RateComputer, RateSample, SnapshotSource};
use crate::device::TargetDevice;
use crate::listener::{ListenerState, StreamListener};
use crate::result::CovResult;
use crate::sink::CoverageSink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Returned by `get_coverage()` when no coverage source is configured
pub const UNAVAILABLE_COVERAGE: f64 = -1.0;

/// One reading with its mode-specific detail
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoverageReading {
    /// Stream mode sample
    Stream(RateSample),
    /// Snapshot mode outcome
    Snapshot(BoundedOutcome),
    /// No usable coverage source
    Unavailable,
}

impl CoverageReading {
    /// Percentage, or [`UNAVAILABLE_COVERAGE`]
    #[must_use]
    pub fn percentage(&self) -> f64 {
        match self {
            Self::Stream(sample) => sample.percentage,
            Self::Snapshot(outcome) => outcome.value(),
            Self::Unavailable => UNAVAILABLE_COVERAGE,
        }
    }
}

#[derive(Debug)]
enum Engine {
    Stream {
        counter: ComponentCounter,
        rates: RateComputer,
        listener: Mutex<Option<StreamListener>>,
    },
    Snapshot {
        request: BoundedSnapshotRequest,
    },
    Disabled {
        reason: String,
    },
}

/// Coverage estimator handed to the exploration driver
#[derive(Debug)]
pub struct CoverageService {
    engine: Engine,
    sink: Option<CoverageSink>,
    growth: Mutex<GrowthMonitor>,
}

impl CoverageService {
    /// Build a service talking to the device over `adb`
    pub fn new(config: CoverageServiceConfig) -> CovResult<Self> {
        let device = Arc::new(config.device.adb_device());
        Self::with_parts(config, device, None)
    }

    /// Stream-mode service over `adb` for an app with `total` methods
    pub fn stream(total: u64, output_dir: impl Into<PathBuf>) -> CovResult<Self> {
        Self::new(
            CoverageServiceConfig::new(ServiceMode::Stream(StreamConfig::new(total)))
                .with_output_dir(output_dir),
        )
    }

    /// Snapshot-mode service over `adb`, writing the sink into the snapshot directory
    pub fn snapshot(config: SnapshotConfig) -> CovResult<Self> {
        let output_dir = config.output_dir.clone();
        Self::new(
            CoverageServiceConfig::new(ServiceMode::Snapshot(config)).with_output_dir(output_dir),
        )
    }

    /// Build a service from explicit collaborators
    ///
    /// When `analyzer` is `None`, snapshot mode uses [`JacocoCliAnalyzer`].
    pub fn with_parts(
        config: CoverageServiceConfig,
        device: Arc<dyn TargetDevice>,
        analyzer: Option<Arc<dyn SnapshotAnalyzer>>,
    ) -> CovResult<Self> {
        let sink = match CoverageSink::create(&config.output_dir) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::error!(dir = %config.output_dir.display(), error = %e, "coverage sink unavailable");
                None
            }
        };

        let engine = match config.validate() {
            Err(e) => {
                tracing::error!(error = %e, "coverage service disabled");
                Engine::Disabled {
                    reason: e.to_string(),
                }
            }
            Ok(()) => match &config.mode {
                ServiceMode::Stream(stream) => Self::stream_engine(stream, device, sink.clone())?,
                ServiceMode::Snapshot(snapshot) => {
                    Self::snapshot_engine(snapshot, device, analyzer, sink.clone())
                }
                ServiceMode::Disabled => {
                    tracing::error!("no coverage mode configured; readings are unavailable");
                    Engine::Disabled {
                        reason: "no coverage mode configured".to_string(),
                    }
                }
            },
        };

        Ok(Self {
            engine,
            sink,
            growth: Mutex::new(GrowthMonitor::new(config.growth)),
        })
    }

    fn stream_engine(
        config: &StreamConfig,
        device: Arc<dyn TargetDevice>,
        sink: Option<CoverageSink>,
    ) -> CovResult<Engine> {
        tracing::info!(total = config.total, tag = %config.tag, "stream coverage mode");
        if let Err(e) = device.clear_log() {
            tracing::warn!(error = %e, "failed to clear device log");
        }
        let counter = ComponentCounter::new();
        let mut rates = RateComputer::new(counter.clone(), config.total, config.tag.clone());
        if let Some(sink) = sink {
            rates = rates.with_sink(sink);
        }
        let listener = StreamListener::start(device, config.listener(), counter.clone())?;
        Ok(Engine::Stream {
            counter,
            rates,
            listener: Mutex::new(Some(listener)),
        })
    }

    fn snapshot_engine(
        config: &SnapshotConfig,
        device: Arc<dyn TargetDevice>,
        analyzer: Option<Arc<dyn SnapshotAnalyzer>>,
        sink: Option<CoverageSink>,
    ) -> Engine {
        tracing::info!(
            file = %config.snapshot_file_name,
            remote = %config.remote_snapshot_path,
            deadline = ?config.deadline,
            "snapshot coverage mode"
        );
        let analyzer = analyzer.unwrap_or_else(|| {
            let mut jacoco = JacocoCliAnalyzer::new(config.jacoco_cli.clone());
            if let Some(java) = &config.java {
                jacoco = jacoco.with_java(java.clone());
            }
            Arc::new(jacoco)
        });
        let source = SnapshotSource {
            device,
            analyzer,
            output_dir: config.output_dir.clone(),
            snapshot_file_name: config.snapshot_file_name.clone(),
            remote_snapshot_path: config.remote_snapshot_path.clone(),
            analyzable_units_path: config.analyzable_units_path.clone(),
        };
        let mut request = BoundedSnapshotRequest::new(source).with_deadline(config.deadline);
        if let Some(sink) = sink {
            request = request.with_sink(sink);
        }
        Engine::Snapshot { request }
    }

    /// Current coverage percentage (0-100), or [`UNAVAILABLE_COVERAGE`]
    pub fn get_coverage(&self) -> f64 {
        self.read().percentage()
    }

    /// Current coverage with mode-specific detail
    pub fn read(&self) -> CoverageReading {
        match &self.engine {
            Engine::Stream { rates, .. } => CoverageReading::Stream(rates.compute_increment()),
            Engine::Snapshot { request } => CoverageReading::Snapshot(request.get_coverage()),
            Engine::Disabled { reason } => {
                tracing::error!(%reason, "coverage requested from a disabled service");
                CoverageReading::Unavailable
            }
        }
    }

    /// Take a reading and report whether coverage growth has stagnated
    pub fn check_low_growth_rate(&self) -> bool {
        self.observe_growth(self.get_coverage())
    }

    /// Feed an already-taken reading into the stagnation window
    ///
    /// The unavailable sentinel is ignored and never reports stagnation.
    pub fn observe_growth(&self, coverage: f64) -> bool {
        if coverage < 0.0 {
            return false;
        }
        let mut growth = self.growth.lock().unwrap_or_else(PoisonError::into_inner);
        let update = growth.update(coverage);
        let stagnant = growth.is_stagnant();
        tracing::info!(
            coverage,
            growth_rate = update.growth_rate,
            threshold = update.threshold,
            stagnant,
            "coverage growth check"
        );
        stagnant
    }

    /// Empty the stagnation window, e.g. after the driver changes strategy
    pub fn clear_growth_window(&self) {
        self.growth
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Stop the stream listener, waiting up to `timeout` for it to exit
    ///
    /// Returns `true` when nothing is left running. Snapshot tasks are never
    /// cancelled and are not waited for.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        match &self.engine {
            Engine::Stream { listener, .. } => {
                let taken = listener
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                taken.map_or(true, |l| l.shutdown(timeout))
            }
            Engine::Snapshot { .. } | Engine::Disabled { .. } => true,
        }
    }

    /// Mode name: `stream`, `snapshot`, or `disabled`
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self.engine {
            Engine::Stream { .. } => "stream",
            Engine::Snapshot { .. } => "snapshot",
            Engine::Disabled { .. } => "disabled",
        }
    }

    /// Method counter in stream mode
    #[must_use]
    pub fn counter(&self) -> Option<&ComponentCounter> {
        match &self.engine {
            Engine::Stream { counter, .. } => Some(counter),
            _ => None,
        }
    }

    /// Listener state in stream mode; `None` once shut down
    #[must_use]
    pub fn listener_state(&self) -> Option<ListenerState> {
        match &self.engine {
            Engine::Stream { listener, .. } => listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map(StreamListener::state),
            _ => None,
        }
    }

    /// Last completed snapshot in snapshot mode
    #[must_use]
    pub fn last_known(&self) -> Option<KnownCoverage> {
        match &self.engine {
            Engine::Snapshot { request } => Some(request.last_known()),
            _ => None,
        }
    }

    /// Path of `codecoverage.txt`, if it could be created
    #[must_use]
    pub fn sink_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(CoverageSink::path)
    }
}
