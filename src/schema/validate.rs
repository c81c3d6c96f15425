//! Validation of raw tables against a [`ColumnMapping`].
//!
//! The validator checks that every mapped column exists, parses timestamps to
//! UTC-naive values, coerces numeric cells, converts energies to MWh, sorts
//! rows by time, and rejects duplicate timestamps rather than merging them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use super::mapping::{ColumnMapping, Role};
use super::table::{Asset, AssetTable, RawTable, TimeSeriesTable};
use crate::error::{AnalysisError, Result};

/// Cell contents treated as a missing value (case-insensitive).
const MISSING_TOKENS: &[&str] = &["", "na", "nan", "null", "none"];

/// A numeric column to extract from a raw table.
struct NumericColumn<'a> {
    role: Role,
    column: &'a str,
    non_negative: bool,
    scale: f64,
}

impl<'a> NumericColumn<'a> {
    fn plain(role: Role, column: &'a str) -> Self {
        Self {
            role,
            column,
            non_negative: false,
            scale: 1.0,
        }
    }

    fn energy(role: Role, column: &'a str, scale: f64) -> Self {
        Self {
            role,
            column,
            non_negative: true,
            scale,
        }
    }
}

/// Validates and renames raw tables according to a column mapping.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    mapping: &'a ColumnMapping,
}

impl<'a> Validator<'a> {
    pub fn new(mapping: &'a ColumnMapping) -> Self {
        Self { mapping }
    }

    /// Validates the asset table. Asset ids must be non-empty and unique.
    pub fn asset(&self, raw: &RawTable) -> Result<AssetTable> {
        const TABLE: &str = "asset";
        let m = &self.mapping.asset;
        let id_idx = require_column(TABLE, raw, &m.asset_id)?;
        let lat = NumericColumn::plain(Role::Latitude, &m.latitude);
        let lon = NumericColumn::plain(Role::Longitude, &m.longitude);
        let lat_idx = require_column(TABLE, raw, lat.column)?;
        let lon_idx = require_column(TABLE, raw, lon.column)?;
        check_row_widths(TABLE, raw)?;
        if raw.is_empty() {
            return Err(AnalysisError::schema(TABLE, &m.asset_id, "table has no rows"));
        }

        let mut seen = HashSet::new();
        let mut assets = Vec::with_capacity(raw.len());
        for (i, row) in raw.rows().iter().enumerate() {
            let id = row[id_idx].trim();
            if id.is_empty() {
                return Err(AnalysisError::schema(
                    TABLE,
                    &m.asset_id,
                    format!("row {i}: empty asset id"),
                ));
            }
            if !seen.insert(id) {
                return Err(AnalysisError::schema(
                    TABLE,
                    &m.asset_id,
                    format!("duplicate asset id `{id}`"),
                ));
            }
            let latitude = parse_present(TABLE, &lat, i, &row[lat_idx])?;
            let longitude = parse_present(TABLE, &lon, i, &row[lon_idx])?;
            assets.push(Asset {
                id: id.to_string(),
                latitude,
                longitude,
            });
        }
        Ok(AssetTable::from_assets(assets))
    }

    pub fn meter(&self, raw: &RawTable) -> Result<TimeSeriesTable> {
        let m = &self.mapping.meter;
        validate_time_series(
            "meter",
            raw,
            &m.time,
            None,
            &[NumericColumn::energy(
                Role::NetEnergy,
                &m.net_energy,
                m.energy_unit.to_mwh(),
            )],
        )
    }

    pub fn curtail(&self, raw: &RawTable) -> Result<TimeSeriesTable> {
        let m = &self.mapping.curtail;
        let scale = m.energy_unit.to_mwh();
        validate_time_series(
            "curtail",
            raw,
            &m.time,
            None,
            &[
                NumericColumn::energy(Role::AvailabilityLoss, &m.availability_loss, scale),
                NumericColumn::energy(Role::CurtailmentLoss, &m.curtailment_loss, scale),
            ],
        )
    }

    pub fn scada(&self, raw: &RawTable) -> Result<TimeSeriesTable> {
        let m = &self.mapping.scada;
        let mut columns = vec![NumericColumn::plain(Role::Power, &m.power)];
        if let Some(ws) = &m.wind_speed {
            columns.push(NumericColumn::plain(Role::WindSpeed, ws));
        }
        validate_time_series("scada", raw, &m.time, Some(&m.asset_id), &columns)
    }

    /// Validates one named reanalysis source.
    pub fn reanalysis(&self, source: &str, raw: &RawTable) -> Result<TimeSeriesTable> {
        let table = format!("reanalysis:{source}");
        let m = self.mapping.reanalysis.get(source).ok_or_else(|| {
            AnalysisError::schema(&table, "*", "no column mapping configured for this source")
        })?;
        if !m.has_wind_speed() {
            return Err(AnalysisError::schema(
                &table,
                Role::WindSpeed.as_str(),
                "neither wind_speed nor both wind_speed_u/wind_speed_v are mapped",
            ));
        }

        let optional = [
            (Role::WindSpeed, &m.wind_speed),
            (Role::WindSpeedU, &m.wind_speed_u),
            (Role::WindSpeedV, &m.wind_speed_v),
            (Role::AirDensity, &m.air_density),
        ];
        let columns: Vec<NumericColumn<'_>> = optional
            .into_iter()
            .filter_map(|(role, column)| {
                column
                    .as_deref()
                    .map(|c| NumericColumn::plain(role, c))
            })
            .collect();
        validate_time_series(&table, raw, &m.time, None, &columns)
    }
}

fn validate_time_series(
    table: &str,
    raw: &RawTable,
    time_column: &str,
    asset_column: Option<&str>,
    numeric: &[NumericColumn<'_>],
) -> Result<TimeSeriesTable> {
    let time_idx = require_column(table, raw, time_column)?;
    let asset_idx = asset_column
        .map(|c| require_column(table, raw, c))
        .transpose()?;
    let numeric_idx = numeric
        .iter()
        .map(|c| require_column(table, raw, c.column))
        .collect::<Result<Vec<_>>>()?;
    check_row_widths(table, raw)?;
    if raw.is_empty() {
        return Err(AnalysisError::schema(table, time_column, "table has no rows"));
    }

    let mut timestamps = Vec::with_capacity(raw.len());
    for (i, row) in raw.rows().iter().enumerate() {
        let cell = row[time_idx].trim();
        let ts = parse_timestamp(cell).ok_or_else(|| {
            AnalysisError::schema(
                table,
                time_column,
                format!("row {i}: `{cell}` is not a timestamp"),
            )
        })?;
        timestamps.push(ts);
    }

    let asset_ids = match (asset_idx, asset_column) {
        (Some(idx), Some(column)) => {
            let mut ids = Vec::with_capacity(raw.len());
            for (i, row) in raw.rows().iter().enumerate() {
                let id = row[idx].trim();
                if id.is_empty() {
                    return Err(AnalysisError::schema(
                        table,
                        column,
                        format!("row {i}: empty asset id"),
                    ));
                }
                ids.push(id.to_string());
            }
            Some(ids)
        }
        _ => None,
    };

    let mut columns = Vec::with_capacity(numeric.len());
    for (target, &idx) in numeric.iter().zip(&numeric_idx) {
        let values = raw
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| parse_numeric(table, target, i, &row[idx]))
            .collect::<Result<Vec<_>>>()?;
        columns.push(values);
    }

    // Stable sort keeps input order among equal keys, so duplicates sit side by side.
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
        timestamps[a]
            .cmp(&timestamps[b])
            .then_with(|| match &asset_ids {
                Some(ids) => ids[a].cmp(&ids[b]),
                None => Ordering::Equal,
            })
    });
    for pair in order.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let same_asset = asset_ids.as_ref().is_none_or(|ids| ids[a] == ids[b]);
        if timestamps[a] == timestamps[b] && same_asset {
            return Err(AnalysisError::DuplicateTimestamp {
                table: table.to_string(),
                timestamp: timestamps[a],
                asset_id: asset_ids.as_ref().map(|ids| ids[a].clone()),
            });
        }
    }

    let sorted_timestamps = order.iter().map(|&i| timestamps[i]).collect();
    let sorted_ids = asset_ids.map(|ids| order.iter().map(|&i| ids[i].clone()).collect());
    let values: BTreeMap<Role, Vec<Option<f64>>> = numeric
        .iter()
        .zip(columns)
        .map(|(target, col)| (target.role, order.iter().map(|&i| col[i]).collect()))
        .collect();

    Ok(TimeSeriesTable::from_parts(
        table.to_string(),
        sorted_timestamps,
        sorted_ids,
        values,
    ))
}

/// Parses a timestamp and normalises it to UTC-naive.
///
/// Offsets (`+01:00`, `Z`) are applied before the offset is dropped; values
/// without an offset are taken as UTC already.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_utc());
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn require_column(table: &str, raw: &RawTable, column: &str) -> Result<usize> {
    raw.column_index(column).ok_or_else(|| {
        AnalysisError::schema(table, column, "mapped column is missing from the table")
    })
}

fn check_row_widths(table: &str, raw: &RawTable) -> Result<()> {
    let width = raw.headers().len();
    if let Some((i, row)) = raw.rows().iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(AnalysisError::schema(
            table,
            "*",
            format!("row {i} has {} cells, expected {width}", row.len()),
        ));
    }
    Ok(())
}

fn parse_numeric(
    table: &str,
    target: &NumericColumn<'_>,
    row: usize,
    cell: &str,
) -> Result<Option<f64>> {
    let cell = cell.trim();
    if MISSING_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t)) {
        return Ok(None);
    }
    let value: f64 = cell.parse().map_err(|_| {
        AnalysisError::schema(
            table,
            target.column,
            format!("row {row}: `{cell}` is not numeric"),
        )
    })?;
    if !value.is_finite() {
        return Err(AnalysisError::schema(
            table,
            target.column,
            format!("row {row}: non-finite value `{cell}`"),
        ));
    }
    if target.non_negative && value < 0.0 {
        return Err(AnalysisError::schema(
            table,
            target.column,
            format!("row {row}: negative {} value {value}", target.role),
        ));
    }
    Ok(Some(value * target.scale))
}

fn parse_present(table: &str, target: &NumericColumn<'_>, row: usize, cell: &str) -> Result<f64> {
    parse_numeric(table, target, row, cell)?.ok_or_else(|| {
        AnalysisError::schema(table, target.column, format!("row {row}: missing value"))
    })
}
