//! Coverage accounting
//!
//! Pure counting and aggregation: no threads and no device I/O live here.
//!
//! ```text
//! log line ─► LogLine::parse ─► ComponentCounter ─► RateComputer ─► %
//! snapshot ─► SnapshotAnalyzer ─► SnapshotAggregator (UnitVisitor) ─► %
//!                                       % ─► GrowthMonitor ─► stagnant?
//! ```

mod counter;
mod growth;
mod parser;
mod rate;
mod snapshot;

pub use counter::{ComponentCounter, METHODS};
pub use growth::{GrowthConfig, GrowthMonitor, GrowthUpdate, MIN_THRESHOLD};
pub use parser::{LogLine, METHOD_KIND};
pub use rate::{percentage_of, RateComputer, RateSample, TaggedSample, INITIAL_SAMPLE_COUNT};
pub use snapshot::{
    SnapshotAggregator, SnapshotSource, SnapshotTotals, UnitCoverage, UnitVisitor,
};
