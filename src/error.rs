//! Error taxonomy for dataset construction, Monte Carlo runs, and I/O.

use chrono::NaiveDateTime;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors surfaced to the caller of an analysis run.
///
/// Construction-time variants (`Schema` through `ReanalysisAlignment`) are
/// raised before the Monte Carlo loop starts. `MonteCarloConvergence` and
/// `EmptyResultSet` are raised after it. `InsufficientData` and
/// `RegressionFit` only appear here when the regressor is driven directly;
/// inside the engine they stay [`IterationError`]s.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("schema error in {table} table, column `{column}`: {reason}")]
    Schema {
        table: String,
        column: String,
        reason: String,
    },
    #[error("duplicate timestamp {timestamp} in {table} table{}", asset_suffix(.asset_id))]
    DuplicateTimestamp {
        table: String,
        timestamp: NaiveDateTime,
        asset_id: Option<String>,
    },
    #[error("asset `{asset_id}` referenced in SCADA data is not in the asset table")]
    UnknownAsset { asset_id: String },
    #[error("insufficient overlap between {tables}: {detail}")]
    InsufficientOverlap { tables: String, detail: String },
    #[error("reanalysis source `{source_name}` cannot be aligned: {reason}")]
    ReanalysisAlignment { source_name: String, reason: String },
    #[error("insufficient data: {observed} paired observations, {required} required")]
    InsufficientData { observed: usize, required: usize },
    #[error("regression fit failed: {reason}")]
    RegressionFit { reason: String },
    #[error(
        "Monte Carlo run did not converge: {failed} of {attempted} iterations failed (ceiling {max_fraction})"
    )]
    MonteCarloConvergence {
        failed: usize,
        attempted: usize,
        max_fraction: f64,
    },
    #[error("no Monte Carlo iteration succeeded")]
    EmptyResultSet,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn asset_suffix(asset_id: &Option<String>) -> String {
    asset_id
        .as_ref()
        .map(|id| format!(" for asset `{id}`"))
        .unwrap_or_default()
}

impl AnalysisError {
    pub(crate) fn schema(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Schema {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a single Monte Carlo iteration. Recorded, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IterationError {
    #[error("insufficient data: {observed} paired observations, {required} required")]
    InsufficientData { observed: usize, required: usize },
    #[error("regression fit failed: {reason}")]
    RegressionFit { reason: String },
}

impl IterationError {
    pub(crate) fn fit(reason: impl Into<String>) -> Self {
        Self::RegressionFit {
            reason: reason.into(),
        }
    }

    /// Short machine-friendly label used in exports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::RegressionFit { .. } => "regression_fit",
        }
    }
}

impl From<IterationError> for AnalysisError {
    fn from(err: IterationError) -> Self {
        match err {
            IterationError::InsufficientData { observed, required } => {
                Self::InsufficientData { observed, required }
            }
            IterationError::RegressionFit { reason } => Self::RegressionFit { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn duplicate_timestamp_message_names_asset() {
        let ts = NaiveDate::from_ymd_opt(2014, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 10, 0))
            .expect("valid date");
        let err = AnalysisError::DuplicateTimestamp {
            table: "scada".into(),
            timestamp: ts,
            asset_id: Some("R80711".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("scada"));
        assert!(msg.contains("R80711"));
    }

    #[test]
    fn iteration_error_converts_to_analysis_error() {
        let err: AnalysisError = IterationError::InsufficientData {
            observed: 6,
            required: 12,
        }
        .into();
        assert!(matches!(
            err,
            AnalysisError::InsufficientData {
                observed: 6,
                required: 12
            }
        ));
    }
}
