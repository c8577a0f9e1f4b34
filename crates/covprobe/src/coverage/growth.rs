//! Coverage Growth Monitor
//!
//! Detects stagnating coverage with an adaptive threshold. Each reading adds
//! a growth rate `g_n = (x_n - x_{n-1}) / x_{n-1}` to a sliding window. Once
//! enough history exists the threshold follows
//! `T_n = max(T_{n-1} * exp(k * (g_n - G)), 0.01)` where `G` is the mean
//! growth rate so far. Coverage is stagnant when a full window holds no rate
//! above the threshold.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Floor for the adjusted threshold
pub const MIN_THRESHOLD: f64 = 0.01;

/// Cap on a single growth rate's contribution to the running sum
pub const MAX_GROWTH_CONTRIBUTION: f64 = 10.0;

/// Growth monitor tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Number of growth rates checked for stagnation
    pub window_size: usize,
    /// Initial threshold
    pub min_growth_rate: f64,
    /// Adjustment factor `k`
    pub factor: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_growth_rate: 0.05,
            factor: 0.5,
        }
    }
}

/// Result of feeding one reading to the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthUpdate {
    /// Growth rate relative to the previous reading
    pub growth_rate: f64,
    /// Threshold after this reading
    pub threshold: f64,
}

/// Adaptive-threshold stagnation detector
#[derive(Debug, Clone)]
pub struct GrowthMonitor {
    config: GrowthConfig,
    previous: Option<f64>,
    readings: usize,
    window: VecDeque<f64>,
    growth_sum: f64,
    threshold: f64,
}

impl GrowthMonitor {
    /// Create a monitor
    #[must_use]
    pub fn new(config: GrowthConfig) -> Self {
        Self {
            threshold: config.min_growth_rate,
            config,
            previous: None,
            readings: 0,
            window: VecDeque::with_capacity(config.window_size + 1),
            growth_sum: 0.0,
        }
    }

    /// Feed a coverage reading
    pub fn update(&mut self, current: f64) -> GrowthUpdate {
        let previous = self.previous.replace(current);
        self.readings += 1;
        let n = self.readings;

        let mut growth_rate = 0.0;
        if let Some(previous) = previous {
            if previous != 0.0 {
                growth_rate = (current - previous) / previous;
            }
            self.growth_sum += growth_rate.min(MAX_GROWTH_CONTRIBUTION);
            self.window.push_back(growth_rate);
            if self.window.len() > self.config.window_size {
                self.window.pop_front();
            }
            tracing::debug!(
                window = self.window.len(),
                growth_rate,
                sum = self.growth_sum,
                "coverage growth"
            );
        }

        if n >= self.config.window_size && n >= 2 {
            let baseline = self.growth_sum / (n - 1) as f64;
            let delta = growth_rate - baseline;
            let adjusted = self.threshold * (self.config.factor * delta).exp();
            self.threshold = adjusted.max(MIN_THRESHOLD);
            tracing::debug!(
                baseline,
                delta,
                threshold = self.threshold,
                "growth threshold adjusted"
            );
        }

        GrowthUpdate {
            growth_rate,
            threshold: self.threshold,
        }
    }

    /// True when a full window holds no growth rate above the threshold
    #[must_use]
    pub fn is_stagnant(&self) -> bool {
        if self.config.window_size == 0 || self.window.len() < self.config.window_size {
            return false;
        }
        match self
            .window
            .iter()
            .rev()
            .position(|&g| g > self.threshold)
        {
            Some(from_end) => {
                tracing::debug!(from_end, "growth above threshold");
                false
            }
            None => true,
        }
    }

    /// Forget the window; the reading count, last reading, and threshold are kept
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Current threshold
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Readings seen so far
    #[must_use]
    pub fn readings(&self) -> usize {
        self.readings
    }

    /// Growth rates currently in the window, oldest first
    #[must_use]
    pub fn window(&self) -> Vec<f64> {
        self.window.iter().copied().collect()
    }
}

impl Default for GrowthMonitor {
    fn default() -> Self {
        Self::new(GrowthConfig::default())
    }
}
