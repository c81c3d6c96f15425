//! Canonical column roles, raw and validated tables, and the validator.

pub mod mapping;
pub mod table;
pub mod validate;

pub use mapping::{
    AssetMapping, ColumnMapping, CurtailMapping, EnergyUnit, MeterMapping, ReanalysisMapping,
    Role, ScadaMapping,
};
pub use table::{Asset, AssetTable, RawTable, TimeSeriesTable};
pub use validate::{Validator, parse_timestamp};
