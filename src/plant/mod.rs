//! Plant dataset construction, period resampling, and reanalysis alignment.

pub mod dataset;
pub mod period;
pub mod reanalysis;

pub use dataset::{CompositeRow, CompositeTable, PlantDataset};
pub use period::{Aggregation, Coverage, PeriodValue, Resolution};
pub use reanalysis::{
    AlignedReanalysis, ReanalysisAligner, ReanalysisNormal, ResourceSample, ResourceSeries,
};
