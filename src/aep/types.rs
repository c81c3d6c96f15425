//! Iteration plans, per-iteration outcomes, and the Monte Carlo result set.

use serde::Serialize;

use super::regression::RegressionForm;
use crate::error::{AnalysisError, IterationError, Result};

/// Perturbation parameters of one Monte Carlo draw.
///
/// Fully determined by the master seed and `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationIteration {
    /// Iteration number, `0..num_simulations`.
    pub index: usize,
    /// Seed of this iteration's random stream.
    pub seed: u64,
    /// Reanalysis source drawn for this iteration.
    pub source: String,
    pub regression_form: RegressionForm,
    /// Outlier cut in robust standard deviations.
    pub outlier_threshold: f64,
    /// Bootstrap resample of composite row indices, with replacement.
    pub sample_indices: Vec<usize>,
    /// Trailing years of the reanalysis record to project onto; `None` uses all of it.
    pub long_term_years: Option<u32>,
    /// Multiplicative perturbation of metered energy.
    pub meter_factor: f64,
    /// Multiplicative perturbation of the loss fractions.
    pub loss_factor: f64,
}

/// Output of one successful iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AepResult {
    /// Long-term annual energy production (MWh/year), gross of losses.
    pub aep_mwh: f64,
    pub availability_loss_fraction: f64,
    pub curtailment_loss_fraction: f64,
    /// Coefficient of determination of the fit, in `[0, 1]`.
    pub r_squared: f64,
    /// Paired observations used by the fit after outlier exclusion.
    pub observations: usize,
    /// Reanalysis periods the fit was projected onto.
    pub long_term_periods: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Succeeded(AepResult),
    Failed(IterationError),
    /// Never started because the run was cancelled first.
    Cancelled,
}

impl IterationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One slot of the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub index: usize,
    pub seed: u64,
    /// Source and form of the plan; absent for cancelled iterations.
    pub source: Option<String>,
    pub regression_form: Option<RegressionForm>,
    pub outcome: IterationOutcome,
}

impl IterationRecord {
    pub fn result(&self) -> Option<&AepResult> {
        match &self.outcome {
            IterationOutcome::Succeeded(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&IterationError> {
        match &self.outcome {
            IterationOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Every iteration of one run, ordered by iteration index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonteCarloAepResultSet {
    records: Vec<IterationRecord>,
}

impl MonteCarloAepResultSet {
    /// Builds the set, sorting records by iteration index.
    pub fn new(mut records: Vec<IterationRecord>) -> Self {
        records.sort_by_key(|r| r.index);
        Self { records }
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Successful results in iteration order.
    pub fn results(&self) -> impl Iterator<Item = &AepResult> {
        self.records.iter().filter_map(IterationRecord::result)
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.seed).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results().count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.error().is_some()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == IterationOutcome::Cancelled)
            .count()
    }

    /// Iterations that ran, successfully or not.
    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// Failed over attempted iterations; 0 when nothing was attempted.
    pub fn failure_fraction(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            attempted => self.failed() as f64 / attempted as f64,
        }
    }

    /// Checks the run-level success criteria.
    ///
    /// # Errors
    ///
    /// * `MonteCarloConvergence` if the failure fraction exceeds `max_failed_fraction`
    /// * `EmptyResultSet` if no iteration succeeded
    pub fn ensure_converged(&self, max_failed_fraction: f64) -> Result<()> {
        if self.failure_fraction() > max_failed_fraction {
            return Err(AnalysisError::MonteCarloConvergence {
                failed: self.failed(),
                attempted: self.attempted(),
                max_fraction: max_failed_fraction,
            });
        }
        if self.succeeded() == 0 {
            return Err(AnalysisError::EmptyResultSet);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, outcome: IterationOutcome) -> IterationRecord {
        IterationRecord {
            index,
            seed: index as u64 * 10,
            source: Some("era5".into()),
            regression_form: Some(RegressionForm::Ols),
            outcome,
        }
    }

    fn ok(aep: f64) -> IterationOutcome {
        IterationOutcome::Succeeded(AepResult {
            aep_mwh: aep,
            availability_loss_fraction: 0.0,
            curtailment_loss_fraction: 0.0,
            r_squared: 1.0,
            observations: 24,
            long_term_periods: 240,
        })
    }

    fn failed() -> IterationOutcome {
        IterationOutcome::Failed(IterationError::InsufficientData {
            observed: 6,
            required: 12,
        })
    }

    #[test]
    fn records_are_ordered_by_index() {
        let set = MonteCarloAepResultSet::new(vec![
            record(2, ok(3.0)),
            record(0, ok(1.0)),
            record(1, failed()),
        ]);
        assert_eq!(set.seeds(), vec![0, 10, 20]);
        let aeps: Vec<f64> = set.results().map(|r| r.aep_mwh).collect();
        assert_eq!(aeps, vec![1.0, 3.0]);
    }

    #[test]
    fn cancelled_iterations_are_not_attempts() {
        let set = MonteCarloAepResultSet::new(vec![
            record(0, ok(1.0)),
            record(1, failed()),
            record(2, IterationOutcome::Cancelled),
            record(3, IterationOutcome::Cancelled),
        ]);
        assert_eq!(set.attempted(), 2);
        assert_eq!(set.cancelled(), 2);
        assert_eq!(set.failure_fraction(), 0.5);
        assert!(set.ensure_converged(0.5).is_ok());
        assert!(matches!(
            set.ensure_converged(0.4),
            Err(AnalysisError::MonteCarloConvergence {
                failed: 1,
                attempted: 2,
                ..
            })
        ));
    }

    #[test]
    fn nothing_attempted_is_an_empty_result_set() {
        let set = MonteCarloAepResultSet::new(vec![record(0, IterationOutcome::Cancelled)]);
        assert!(matches!(
            set.ensure_converged(0.5),
            Err(AnalysisError::EmptyResultSet)
        ));
    }

    #[test]
    fn all_failed_exceeds_ceiling() {
        let set = MonteCarloAepResultSet::new(vec![record(0, failed()), record(1, failed())]);
        assert!(matches!(
            set.ensure_converged(0.5),
            Err(AnalysisError::MonteCarloConvergence { .. })
        ));
        // A ceiling of 1 tolerates every failure but still needs one success.
        assert!(matches!(
            set.ensure_converged(1.0),
            Err(AnalysisError::EmptyResultSet)
        ));
    }
}
