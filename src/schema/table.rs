//! Raw loader output and the validated tables built from it.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::mapping::Role;

/// Untyped table as handed over by a loader: a header row and string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Creates an empty table with the given header row.
    pub fn with_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Renames a header in place. Returns `false` if `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.headers[idx] = to.to_string();
                true
            }
            None => false,
        }
    }
}

/// One row of the asset table.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Validated per-turbine static attributes, unique by id.
#[derive(Debug, Clone, Default)]
pub struct AssetTable {
    assets: Vec<Asset>,
}

impl AssetTable {
    pub(crate) fn from_assets(assets: Vec<Asset>) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.iter().any(|a| a.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }
}

/// Validated time-indexed table.
///
/// Rows are sorted by timestamp (then asset id), timestamps are UTC-naive,
/// and `(asset_id, timestamp)` is unique. Present numeric values are finite;
/// energy and loss values are non-negative and expressed in MWh.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    name: String,
    timestamps: Vec<NaiveDateTime>,
    asset_ids: Option<Vec<String>>,
    values: BTreeMap<Role, Vec<Option<f64>>>,
}

impl TimeSeriesTable {
    pub(crate) fn from_parts(
        name: String,
        timestamps: Vec<NaiveDateTime>,
        asset_ids: Option<Vec<String>>,
        values: BTreeMap<Role, Vec<Option<f64>>>,
    ) -> Self {
        Self {
            name,
            timestamps,
            asset_ids,
            values,
        }
    }

    /// Table label used in error messages (`meter`, `reanalysis:era5`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn asset_ids(&self) -> Option<&[String]> {
        self.asset_ids.as_deref()
    }

    pub fn has(&self, role: Role) -> bool {
        self.values.contains_key(&role)
    }

    pub fn values(&self, role: Role) -> Option<&[Option<f64>]> {
        self.values.get(&role).map(Vec::as_slice)
    }

    /// First and last timestamp, if any rows exist.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.timestamps.first()?, *self.timestamps.last()?))
    }
}
