//! End-to-end analysis: raw tables in, AEP report out.
//!
//! This is the surface the CLI and the HTTP API share. Loading happens once
//! in [`AnalysisInputs::load`]; [`run_analysis`] validates, builds the
//! dataset, runs the Monte Carlo loop and summarises it.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, info};

use crate::aep::{
    AepSummary, CancellationToken, MonteCarloAepResultSet, MonteCarloEngine, ResultsAggregator,
};
use crate::config::{AnalysisConfig, DataConfig};
use crate::error::{AnalysisError, Result};
use crate::io::load::load_csv;
use crate::plant::PlantDataset;
use crate::schema::{RawTable, Validator};

/// Raw, unvalidated tables of one plant.
///
/// `curtail` is a distinct input even when it is read from the meter file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInputs {
    pub asset: RawTable,
    pub meter: RawTable,
    pub curtail: RawTable,
    pub scada: RawTable,
    /// Reanalysis tables keyed by source name.
    pub reanalysis: BTreeMap<String, RawTable>,
}

impl AnalysisInputs {
    /// Loads the plant tables and the reanalysis files of `sources`.
    ///
    /// # Arguments
    ///
    /// * `data` - File locations; relative paths resolve against `data.dir`
    /// * `sources` - Reanalysis sources to load
    ///
    /// # Errors
    ///
    /// * `InvalidConfig` if a source has no file configured
    /// * `Io` or `Csv` if a file cannot be read
    pub fn load(data: &DataConfig, sources: &[String]) -> Result<Self> {
        let mut reanalysis = BTreeMap::new();
        for source in sources {
            let path = data.reanalysis.get(source).ok_or_else(|| {
                AnalysisError::InvalidConfig(format!(
                    "no file configured for reanalysis source `{source}` (data.reanalysis.{source})"
                ))
            })?;
            reanalysis.insert(source.clone(), load_csv(&data.resolve(path))?);
        }

        let inputs = Self {
            asset: load_csv(&data.resolve(&data.asset))?,
            meter: load_csv(&data.resolve(&data.meter))?,
            curtail: load_csv(&data.curtail_path())?,
            scada: load_csv(&data.resolve(&data.scada))?,
            reanalysis,
        };
        info!(
            dir = %data.dir.display(),
            meter_rows = inputs.meter.len(),
            scada_rows = inputs.scada.len(),
            sources = inputs.reanalysis.len(),
            "input tables loaded"
        );
        Ok(inputs)
    }
}

/// Validates every raw table against the configured mapping and assembles
/// the plant dataset.
///
/// # Errors
///
/// Any construction-time error: `Schema`, `DuplicateTimestamp`,
/// `UnknownAsset`, `InsufficientOverlap`, `ReanalysisAlignment`.
pub fn build_dataset(config: &AnalysisConfig, inputs: &AnalysisInputs) -> Result<PlantDataset> {
    let validator = Validator::new(&config.mapping);
    let reanalysis = inputs
        .reanalysis
        .iter()
        .map(|(source, raw)| {
            validator
                .reanalysis(source, raw)
                .map(|table| (source.clone(), table))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    PlantDataset::new(
        config.plant.capacity_mw,
        config.analysis.aggregation_resolution,
        config.analysis.min_period_completeness,
        validator.asset(&inputs.asset)?,
        validator.meter(&inputs.meter)?,
        validator.curtail(&inputs.curtail)?,
        validator.scada(&inputs.scada)?,
        reanalysis,
    )
}

/// What a run produced. The result set survives a failed convergence check
/// so callers can still report iteration counts.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Per-iteration records; `None` if the run never reached the loop.
    pub results: Option<MonteCarloAepResultSet>,
    pub summary: Result<AepSummary>,
}

impl AnalysisOutcome {
    fn failed(err: AnalysisError) -> Self {
        Self {
            results: None,
            summary: Err(err),
        }
    }
}

/// Runs one complete analysis.
///
/// Every failure, from config validation to convergence, ends up in
/// `summary`.
pub fn run_analysis(
    config: &AnalysisConfig,
    inputs: &AnalysisInputs,
    cancel: &CancellationToken,
) -> AnalysisOutcome {
    let errors = config.validate();
    if !errors.is_empty() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        error!(%message, "analysis rejected");
        return AnalysisOutcome::failed(AnalysisError::InvalidConfig(message));
    }

    let dataset = match build_dataset(config, inputs) {
        Ok(d) => d,
        Err(err) => {
            error!(error = %err, "dataset construction failed");
            return AnalysisOutcome::failed(err);
        }
    };

    let set = match MonteCarloEngine::new(&dataset, &config.analysis)
        .and_then(|engine| engine.execute(cancel))
    {
        Ok(set) => set,
        Err(err) => {
            error!(error = %err, "Monte Carlo run could not start");
            return AnalysisOutcome::failed(err);
        }
    };

    let summary = set
        .ensure_converged(config.analysis.max_failed_iteration_fraction)
        .and_then(|()| ResultsAggregator::new(config.analysis.percentiles.clone()).summarize(&set));
    match &summary {
        Ok(s) => info!(
            aep_mwh = s.aep_mwh.mean,
            aep_std_mwh = s.aep_mwh.std,
            succeeded = s.succeeded,
            "analysis complete"
        ),
        Err(err) => error!(error = %err, "analysis failed"),
    }

    AnalysisOutcome {
        results: Some(set),
        summary,
    }
}

/// Caller-facing result of an analysis, serialised as JSON by the CLI and
/// the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// `"success"` or `"failure"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aep_mwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aep_std_mwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aep_gwh: Option<f64>,
    /// Metric name → mean across successful iterations.
    pub metrics: BTreeMap<String, f64>,
    /// AEP percentiles keyed `p5`, `p50`, ...
    pub percentiles: BTreeMap<String, f64>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnalysisReport {
    /// Builds the report of a finished run.
    pub fn from_outcome(outcome: &AnalysisOutcome) -> Self {
        match &outcome.summary {
            Ok(summary) => Self::from_summary(summary),
            Err(err) => {
                let mut report = Self::failure(err.to_string());
                if let Some(set) = &outcome.results {
                    report.succeeded = set.succeeded();
                    report.failed = set.failed();
                    report.cancelled = set.cancelled();
                }
                report
            }
        }
    }

    /// A success report from summary statistics.
    pub fn from_summary(summary: &AepSummary) -> Self {
        Self {
            status: "success",
            aep_mwh: Some(summary.aep_mwh.mean),
            aep_std_mwh: Some(summary.aep_mwh.std),
            aep_gwh: Some(summary.aep_mwh.mean / 1000.0),
            metrics: summary.metric_means(),
            percentiles: summary
                .aep_mwh
                .percentiles
                .iter()
                .map(|(p, v)| (format!("p{p}"), *v))
                .collect(),
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
            message: None,
        }
    }

    /// A failure report carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: "failure",
            aep_mwh: None,
            aep_std_mwh: None,
            aep_gwh: None,
            metrics: BTreeMap::new(),
            percentiles: BTreeMap::new(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
