//! API request types.

use serde::Deserialize;

use crate::config::AnalysisConfig;

/// Optional run overrides for `POST /calculate`. An empty body runs the
/// configured analysis unchanged.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalculateRequest {
    /// Iteration count override.
    pub num_simulations: Option<usize>,
    /// Master seed override.
    pub master_seed: Option<u64>,
}

impl CalculateRequest {
    /// Returns a copy of `base` with the overrides applied.
    pub fn apply(&self, base: &AnalysisConfig) -> AnalysisConfig {
        let mut config = base.clone();
        if let Some(n) = self.num_simulations {
            config.analysis.num_simulations = n;
        }
        if let Some(seed) = self.master_seed {
            config.analysis.master_seed = seed;
        }
        config
    }
}
