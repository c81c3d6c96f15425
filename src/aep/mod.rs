//! Regression-based AEP estimation, the Monte Carlo engine, and aggregation.

pub mod cancel;
pub mod engine;
pub mod regression;
pub mod sampling;
pub mod summary;
pub mod types;

pub use cancel::CancellationToken;
pub use engine::MonteCarloEngine;
pub use regression::{AepRegressor, LinearFit, Observation, RegressionForm};
pub use summary::{AepSummary, MetricSummary, ResultsAggregator};
pub use types::{
    AepResult, IterationOutcome, IterationRecord, MonteCarloAepResultSet, SimulationIteration,
};
