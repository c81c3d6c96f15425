//! Long-term wind plant AEP estimation from operational data and reanalysis
//! records, with Monte Carlo propagation of measurement and model uncertainty.

/// Regression, Monte Carlo engine, and result aggregation.
pub mod aep;
pub mod analysis;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
/// Plant dataset, period resampling, and reanalysis alignment.
pub mod plant;
pub mod schema;
