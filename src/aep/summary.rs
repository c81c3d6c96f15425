//! Post-hoc statistics over the successful iterations of a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::types::{AepResult, MonteCarloAepResultSet};
use crate::error::{AnalysisError, Result};

/// Mean, spread, and requested percentiles of one per-iteration metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    /// Sample standard deviation (n − 1 denominator; 0 for one value).
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// `(percentile, value)` pairs in the requested order.
    pub percentiles: Vec<(f64, f64)>,
}

impl MetricSummary {
    /// Summarises `values`. Returns `None` for an empty slice.
    pub fn from_values(values: &[f64], percentiles: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        Some(Self {
            mean,
            std,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: percentiles
                .iter()
                .map(|&p| (p, percentile(&sorted, p)))
                .collect(),
        })
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(q, _)| (*q - p).abs() < 1e-9)
            .map(|(_, v)| *v)
    }
}

/// Linear interpolation between order statistics of a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Statistics of a Monte Carlo run, plus the per-iteration series behind them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AepSummary {
    pub aep_mwh: MetricSummary,
    pub availability_loss_fraction: MetricSummary,
    pub curtailment_loss_fraction: MetricSummary,
    pub r_squared: MetricSummary,
    pub observations: MetricSummary,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Successful results in iteration order.
    pub iterations: Vec<AepResult>,
}

impl AepSummary {
    /// Metric name → mean value across successful iterations.
    pub fn metric_means(&self) -> BTreeMap<String, f64> {
        [
            ("aep_mwh", self.aep_mwh.mean),
            ("aep_gwh", self.aep_mwh.mean / 1000.0),
            (
                "availability_loss_fraction",
                self.availability_loss_fraction.mean,
            ),
            (
                "curtailment_loss_fraction",
                self.curtailment_loss_fraction.mean,
            ),
            ("r_squared", self.r_squared.mean),
            ("observations", self.observations.mean),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// AEP of each successful iteration, in iteration order.
    pub fn aep_series(&self) -> Vec<f64> {
        self.iterations.iter().map(|r| r.aep_mwh).collect()
    }
}

impl fmt::Display for AepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- AEP Summary ---")?;
        writeln!(
            f,
            "Iterations:            {} succeeded, {} failed, {} cancelled",
            self.succeeded, self.failed, self.cancelled
        )?;
        writeln!(
            f,
            "AEP:                   {:.1} MWh/yr (std {:.1} MWh/yr)",
            self.aep_mwh.mean, self.aep_mwh.std
        )?;
        for (p, v) in &self.aep_mwh.percentiles {
            writeln!(f, "  P{:<5}               {:.1} MWh/yr", p, v)?;
        }
        writeln!(
            f,
            "Availability loss:     {:.2}%",
            100.0 * self.availability_loss_fraction.mean
        )?;
        writeln!(
            f,
            "Curtailment loss:      {:.2}%",
            100.0 * self.curtailment_loss_fraction.mean
        )?;
        write!(f, "Mean R²:               {:.3}", self.r_squared.mean)
    }
}

/// Reduces a result set to summary statistics.
#[derive(Debug, Clone)]
pub struct ResultsAggregator {
    percentiles: Vec<f64>,
}

impl Default for ResultsAggregator {
    fn default() -> Self {
        Self::new(vec![5.0, 50.0, 95.0])
    }
}

impl ResultsAggregator {
    pub fn new(percentiles: Vec<f64>) -> Self {
        Self { percentiles }
    }

    /// Summarises successful iterations only.
    ///
    /// # Errors
    ///
    /// `EmptyResultSet` if no iteration succeeded.
    pub fn summarize(&self, set: &MonteCarloAepResultSet) -> Result<AepSummary> {
        let iterations: Vec<AepResult> = set.results().cloned().collect();
        let metric = |f: fn(&AepResult) -> f64| {
            let values: Vec<f64> = iterations.iter().map(f).collect();
            MetricSummary::from_values(&values, &self.percentiles)
                .ok_or(AnalysisError::EmptyResultSet)
        };

        Ok(AepSummary {
            aep_mwh: metric(|r| r.aep_mwh)?,
            availability_loss_fraction: metric(|r| r.availability_loss_fraction)?,
            curtailment_loss_fraction: metric(|r| r.curtailment_loss_fraction)?,
            r_squared: metric(|r| r.r_squared)?,
            observations: metric(|r| r.observations as f64)?,
            succeeded: set.succeeded(),
            failed: set.failed(),
            cancelled: set.cancelled(),
            iterations,
        })
    }
}
