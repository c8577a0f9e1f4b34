//! Polling loop and report rendering

use crate::commands::{OutputFormat, PollArgs};
use crate::error::CliResult;
use covprobe::coverage::SnapshotTotals;
use covprobe::{
    BoundedOutcome, CoverageReading, CoverageService, SnapshotAggregator, UnitCoverage,
    UnitVisitor,
};
use serde::Serialize;
use std::io::Write;

/// One reading as printed by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingReport {
    /// 1-based reading number
    pub index: u64,
    /// Service mode
    pub mode: &'static str,
    /// Percentage, or -1 when unavailable
    pub percentage: f64,
    /// `stream`, `fresh`, `timed_out`, `failed`, or `unavailable`
    pub source: &'static str,
    /// Distinct methods seen (stream mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Known method total (stream mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Percent change since the previous reading (stream mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Stagnation verdict when growth tracking is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stagnant: Option<bool>,
}

impl ReadingReport {
    /// Report for one reading
    #[must_use]
    pub fn new(index: u64, mode: &'static str, reading: &CoverageReading) -> Self {
        let mut report = Self {
            index,
            mode,
            percentage: reading.percentage(),
            source: "unavailable",
            count: None,
            total: None,
            rate: None,
            stagnant: None,
        };
        match reading {
            CoverageReading::Stream(sample) => {
                report.source = "stream";
                report.count = Some(sample.count);
                report.total = Some(sample.total);
                report.rate = Some(sample.rate);
            }
            CoverageReading::Snapshot(outcome) => {
                report.source = match outcome {
                    BoundedOutcome::Fresh(_) => "fresh",
                    BoundedOutcome::TimedOut(_) => "timed_out",
                    BoundedOutcome::Failed(_) => "failed",
                };
            }
            CoverageReading::Unavailable => {}
        }
        report
    }

    /// Human-readable line
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut line = match (self.count, self.total, self.rate) {
            (Some(count), Some(total), Some(rate)) => format!(
                "[{}] {:8.5}% ({count}/{total}) --> {rate:8.5}",
                self.mode, self.percentage
            ),
            _ if self.source == "unavailable" => format!("[{}] unavailable", self.mode),
            _ => format!("[{}] {:8.5}% {}", self.mode, self.percentage, self.source),
        };
        if let Some(stagnant) = self.stagnant {
            line.push_str(if stagnant { " stagnant" } else { " growing" });
        }
        line
    }
}

/// Take `poll.count` readings (forever when 0), printing each to `out`
///
/// Returns the number of readings taken.
pub fn poll(service: &CoverageService, poll: &PollArgs, out: &mut impl Write) -> CliResult<u64> {
    let mut index = 0;
    loop {
        if poll.count != 0 && index >= poll.count {
            break;
        }
        if index > 0 {
            std::thread::sleep(poll.interval());
        }
        index += 1;

        let reading = service.read();
        let mut report = ReadingReport::new(index, service.mode(), &reading);
        if poll.growth {
            report.stagnant = Some(service.observe_growth(report.percentage));
        }
        match poll.format {
            OutputFormat::Text => writeln!(out, "{}", report.render_text())?,
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&report)?)?,
        }
        out.flush()?;
    }
    Ok(index)
}

/// Method totals of an offline report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzeReport {
    /// Summed counts
    #[serde(flatten)]
    pub totals: SnapshotTotals,
    /// `covered / total * 100`; absent when the report has no methods
    pub percentage: Option<f64>,
}

impl AnalyzeReport {
    /// Sum the units of a parsed report
    #[must_use]
    pub fn from_units(units: &[UnitCoverage]) -> Self {
        let mut aggregator = SnapshotAggregator::new();
        for unit in units {
            aggregator.visit(unit);
        }
        Self {
            totals: aggregator.totals(),
            percentage: aggregator.ratio().map(|r| r * 100.0),
        }
    }

    /// Human-readable summary
    #[must_use]
    pub fn render_text(&self) -> String {
        let pct = self
            .percentage
            .map_or_else(|| "n/a".to_string(), |p| format!("{p:.5}%"));
        format!(
            "methods: {}/{} covered ({pct}) across {} units",
            self.totals.covered, self.totals.total, self.totals.units
        )
    }
}
