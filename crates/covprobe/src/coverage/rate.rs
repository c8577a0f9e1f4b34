//! Rate Computer
//!
//! Turns the running method count into a percentage of the known total and a
//! percent change since the previous sample.
//!
//! The previous-sample count starts at 1, so the first reported rate is
//! `(count - 1) / 1 * 100`. That inflated first reading is kept as-is and
//! flagged through [`RateSample::first`] rather than hidden.

use super::ComponentCounter;
use crate::sink::CoverageSink;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Initial previous-sample count
pub const INITIAL_SAMPLE_COUNT: u64 = 1;

/// One rate computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Covered share of the total, 0-100
    pub percentage: f64,
    /// Distinct methods seen at sampling time
    pub count: u64,
    /// Known total of instrumentable methods
    pub total: u64,
    /// Percent change relative to the previous sample
    pub rate: f64,
    /// Whether this was the first sample (rate measured against the seed of 1)
    pub first: bool,
}

/// Formats a sample as `[tag] pct% (count/total) --> rate`
#[derive(Debug, Clone, Copy)]
pub struct TaggedSample<'a> {
    tag: &'a str,
    sample: &'a RateSample,
}

impl fmt::Display for TaggedSample<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:8.5}% ({}/{}) --> {:8.5}",
            self.tag, self.sample.percentage, self.sample.count, self.sample.total, self.sample.rate
        )
    }
}

impl RateSample {
    /// Display adapter producing the persisted line
    #[must_use]
    pub fn tagged<'a>(&'a self, tag: &'a str) -> TaggedSample<'a> {
        TaggedSample { tag, sample: self }
    }
}

#[derive(Debug)]
struct SampleState {
    last_count: u64,
    samples: u64,
}

/// Computes coverage percentage and growth from a [`ComponentCounter`]
#[derive(Debug)]
pub struct RateComputer {
    counter: ComponentCounter,
    total: u64,
    tag: String,
    state: Mutex<SampleState>,
    sink: Option<CoverageSink>,
}

impl RateComputer {
    /// Create a rate computer over `counter` with a fixed `total`
    #[must_use]
    pub fn new(counter: ComponentCounter, total: u64, tag: impl Into<String>) -> Self {
        Self {
            counter,
            total,
            tag: tag.into(),
            state: Mutex::new(SampleState {
                last_count: INITIAL_SAMPLE_COUNT,
                samples: 0,
            }),
            sink: None,
        }
    }

    /// Persist every sample to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: CoverageSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sample the counter, update the previous-sample count, and persist the line
    pub fn compute_increment(&self) -> RateSample {
        let sample = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            // Read under the lock so samples see counts in the order they are taken
            let current = self.counter.method_count();
            let last = state.last_count.max(1) as f64;
            let rate = (current as f64 - state.last_count as f64) / last * 100.0;
            let first = state.samples == 0;
            state.last_count = current;
            state.samples += 1;
            RateSample {
                percentage: percentage_of(current, self.total),
                count: current,
                total: self.total,
                rate,
                first,
            }
        };

        let line = sample.tagged(&self.tag).to_string();
        tracing::info!("{line}");
        if let Some(sink) = &self.sink {
            sink.record(&line);
        }
        sample
    }

    /// Known total of instrumentable methods
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Log tag the samples are labelled with
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// `count / total * 100`, or 0 when the total is zero
#[must_use]
pub fn percentage_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}
