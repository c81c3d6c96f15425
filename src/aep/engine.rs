//! Monte Carlo engine: plans, runs, and collects independent AEP iterations.

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info};

use super::cancel::CancellationToken;
use super::regression::{AepRegressor, RegressionForm};
use super::sampling::{
    bootstrap_indices, gaussian_noise, iteration_rng, iteration_seed, uniform_in,
};
use super::types::{IterationOutcome, IterationRecord, MonteCarloAepResultSet, SimulationIteration};
use crate::config::MonteCarloConfig;
use crate::error::{AnalysisError, Result};
use crate::plant::PlantDataset;

/// Runs N randomized AEP estimations over one shared, read-only dataset.
///
/// Iteration `i` only reads the dataset and writes slot `i` of the result
/// set, so iterations run on any number of workers without locking.
#[derive(Debug)]
pub struct MonteCarloEngine<'a> {
    dataset: &'a PlantDataset,
    config: &'a MonteCarloConfig,
    /// Index into `config.reanalysis_sources`, drawn by source weight.
    source_pick: WeightedIndex<f64>,
    regressor: AepRegressor<'a>,
}

impl<'a> MonteCarloEngine<'a> {
    /// Creates an engine after checking the run parameters against the dataset.
    ///
    /// # Arguments
    ///
    /// * `dataset` - Validated plant dataset, shared by every iteration
    /// * `config` - Monte Carlo run parameters
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when N is zero, no source or form is configured, a
    /// configured source is not aligned on the dataset, or the source weights
    /// do not sum to a positive value.
    pub fn new(dataset: &'a PlantDataset, config: &'a MonteCarloConfig) -> Result<Self> {
        if config.num_simulations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "num_simulations must be > 0".to_string(),
            ));
        }
        if config.reanalysis_sources.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "at least one reanalysis source must be selected".to_string(),
            ));
        }
        if let Some(missing) = config
            .reanalysis_sources
            .iter()
            .find(|s| dataset.resource(s).is_none())
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "reanalysis source `{missing}` is not loaded (available: {})",
                dataset.source_names().collect::<Vec<_>>().join(", ")
            )));
        }
        if config.regression_forms.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "at least one regression form must be selected".to_string(),
            ));
        }
        let weights = config.source_weights();
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(AnalysisError::InvalidConfig(
                "reanalysis weights must be finite".to_string(),
            ));
        }
        let source_pick = WeightedIndex::new(&weights).map_err(|e| {
            AnalysisError::InvalidConfig(format!(
                "reanalysis weights must be >= 0 with a positive sum: {e}"
            ))
        })?;

        Ok(Self {
            dataset,
            config,
            source_pick,
            regressor: AepRegressor::new(dataset, config.min_observations_per_iteration),
        })
    }

    /// Draws the perturbation parameters of iteration `index`.
    ///
    /// Draws happen in a fixed order from the iteration's own stream:
    /// bootstrap rows, source, outlier threshold, regression form, long-term
    /// years, meter factor, loss factor.
    pub fn plan(&self, index: usize) -> SimulationIteration {
        let c = self.config;
        let mut rng = iteration_rng(c.master_seed, index);

        let sample_indices = bootstrap_indices(&mut rng, self.dataset.composite().len());
        let source = c.reanalysis_sources[self.source_pick.sample(&mut rng)].clone();
        let [lo, hi] = c.outlier_threshold_range;
        let outlier_threshold = uniform_in(&mut rng, lo, hi);
        let form_pick = uniform_in(&mut rng, 0.0, c.regression_forms.len() as f64) as usize;
        let regression_form = c
            .regression_forms
            .get(form_pick.min(c.regression_forms.len().saturating_sub(1)))
            .copied()
            .unwrap_or(RegressionForm::Ols);
        let long_term_years = c.long_term_years.map(|[lo, hi]| {
            let span = uniform_in(&mut rng, 0.0, f64::from(hi.saturating_sub(lo) + 1)) as u32;
            (lo + span).min(hi)
        });
        let meter_factor = 1.0 + gaussian_noise(&mut rng, c.meter_uncertainty);
        let loss_factor = 1.0 + gaussian_noise(&mut rng, c.loss_uncertainty);

        SimulationIteration {
            index,
            seed: iteration_seed(c.master_seed, index),
            source,
            regression_form,
            outlier_threshold,
            sample_indices,
            long_term_years,
            meter_factor,
            loss_factor,
        }
    }

    fn run_iteration(&self, index: usize, cancel: &CancellationToken) -> IterationRecord {
        if cancel.is_cancelled() {
            return IterationRecord {
                index,
                seed: iteration_seed(self.config.master_seed, index),
                source: None,
                regression_form: None,
                outcome: IterationOutcome::Cancelled,
            };
        }

        let plan = self.plan(index);
        let seed = plan.seed;
        let outcome = match self.regressor.estimate(&plan) {
            Ok(result) => IterationOutcome::Succeeded(result),
            Err(err) => {
                debug!(
                    index,
                    seed,
                    source = plan.source.as_str(),
                    form = plan.regression_form.as_str(),
                    reason = %err,
                    "iteration failed"
                );
                IterationOutcome::Failed(err)
            }
        };
        IterationRecord {
            index,
            seed,
            source: Some(plan.source),
            regression_form: Some(plan.regression_form),
            outcome,
        }
    }

    /// Runs every iteration and records each outcome, without judging the run.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the requested worker pool cannot be started.
    pub fn execute(&self, cancel: &CancellationToken) -> Result<MonteCarloAepResultSet> {
        let n = self.config.num_simulations;
        info!(
            iterations = n,
            master_seed = self.config.master_seed,
            workers = ?self.config.workers,
            parallel = self.config.parallel,
            "starting Monte Carlo run"
        );

        let records: Vec<IterationRecord> = if !self.config.parallel {
            (0..n).map(|i| self.run_iteration(i, cancel)).collect()
        } else if let Some(workers) = self.config.workers {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| {
                    AnalysisError::InvalidConfig(format!(
                        "cannot start {workers} worker threads: {e}"
                    ))
                })?;
            pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|i| self.run_iteration(i, cancel))
                    .collect()
            })
        } else {
            (0..n)
                .into_par_iter()
                .map(|i| self.run_iteration(i, cancel))
                .collect()
        };

        let set = MonteCarloAepResultSet::new(records);
        info!(
            succeeded = set.succeeded(),
            failed = set.failed(),
            cancelled = set.cancelled(),
            "Monte Carlo run finished"
        );
        Ok(set)
    }

    /// Runs every iteration and checks the run-level success criteria.
    ///
    /// # Errors
    ///
    /// * `MonteCarloConvergence` if too many iterations failed
    /// * `EmptyResultSet` if none succeeded
    pub fn run(&self, cancel: &CancellationToken) -> Result<MonteCarloAepResultSet> {
        let set = self.execute(cancel)?;
        set.ensure_converged(self.config.max_failed_iteration_fraction)?;
        Ok(set)
    }
}
