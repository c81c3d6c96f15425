//! The validated, time-aligned representation of one plant.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::period::{Aggregation, Coverage, PeriodValue, Resolution, resample_counted, sampling_step};
use super::reanalysis::{ReanalysisAligner, ResourceSample, ResourceSeries};
use crate::error::{AnalysisError, Result};
use crate::schema::{AssetTable, Role, TimeSeriesTable};

/// One analysis period of the composite table.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRow {
    pub period: NaiveDateTime,
    pub period_hours: f64,
    pub net_energy_mwh: f64,
    pub availability_loss_mwh: f64,
    pub curtailment_loss_mwh: f64,
    /// Availability loss over gross potential energy.
    pub availability_loss_fraction: f64,
    /// Curtailment loss over gross potential energy.
    pub curtailment_loss_fraction: f64,
    /// Net energy over nameplate energy for the period. This is energy
    /// normalised by capacity and period length, the regression response.
    pub capacity_factor: f64,
    /// Smallest share of expected samples present across net energy and
    /// both losses (1.0 for a fully logged period).
    pub completeness: f64,
    /// Resource per aligned reanalysis source, when that source covers the period.
    pub resource: BTreeMap<String, ResourceSample>,
}

impl CompositeRow {
    pub fn gross_energy_mwh(&self) -> f64 {
        self.net_energy_mwh + self.availability_loss_mwh + self.curtailment_loss_mwh
    }
}

/// Period-aggregated join of meter, losses, and reanalysis resource.
///
/// This is the only view of the plant the regressor consumes.
#[derive(Debug, Clone)]
pub struct CompositeTable {
    resolution: Resolution,
    rows: Vec<CompositeRow>,
}

impl CompositeTable {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn rows(&self) -> &[CompositeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn periods(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.period).collect()
    }
}

/// Validated tables of one plant plus its nameplate capacity.
///
/// Read-only once constructed; Monte Carlo iterations share it by reference.
#[derive(Debug)]
pub struct PlantDataset {
    capacity_mw: f64,
    assets: AssetTable,
    meter: TimeSeriesTable,
    curtail: TimeSeriesTable,
    scada: TimeSeriesTable,
    reanalysis: BTreeMap<String, TimeSeriesTable>,
    resources: BTreeMap<String, Box<dyn ResourceSeries>>,
    composite: CompositeTable,
}

impl PlantDataset {
    /// Builds the dataset and its composite table.
    ///
    /// # Arguments
    ///
    /// * `capacity_mw` - Plant nameplate capacity (MW, finite and > 0)
    /// * `resolution` - Analysis period for the composite table
    /// * `min_period_completeness` - Share (0.0 to 1.0) of expected samples a
    ///   period needs in the meter and loss columns to enter the composite
    /// * `assets`, `meter`, `curtail`, `scada` - Validated plant tables
    /// * `reanalysis` - Validated reanalysis tables keyed by source name
    ///
    /// # Errors
    ///
    /// * `InvalidConfig` for a non-positive capacity
    /// * `UnknownAsset` when SCADA references an asset missing from `assets`
    /// * `InsufficientOverlap` when meter, curtailment and SCADA do not share
    ///   one whole calendar month, or no complete period pairs meter with losses
    /// * `ReanalysisAlignment` when a source cannot be aligned
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        capacity_mw: f64,
        resolution: Resolution,
        min_period_completeness: f64,
        assets: AssetTable,
        meter: TimeSeriesTable,
        curtail: TimeSeriesTable,
        scada: TimeSeriesTable,
        reanalysis: BTreeMap<String, TimeSeriesTable>,
    ) -> Result<Self> {
        if !capacity_mw.is_finite() || capacity_mw <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "plant capacity must be finite and > 0 MW, got {capacity_mw}"
            )));
        }
        check_assets(&assets, &scada)?;
        check_overlap(&meter, &curtail, &scada)?;

        let mut rows = base_rows(
            capacity_mw,
            resolution,
            min_period_completeness,
            &meter,
            &curtail,
        )?;
        let periods: Vec<NaiveDateTime> = rows.iter().map(|r| r.period).collect();
        let resources = ReanalysisAligner::new(resolution).align_all(&reanalysis, &periods)?;
        for row in &mut rows {
            for (source, series) in &resources {
                if let Some(sample) = series.sample_at(row.period) {
                    row.resource.insert(source.clone(), *sample);
                }
            }
        }

        info!(
            capacity_mw,
            resolution = resolution.as_str(),
            assets = assets.len(),
            periods = rows.len(),
            sources = resources.len(),
            "plant dataset constructed"
        );

        Ok(Self {
            capacity_mw,
            assets,
            meter,
            curtail,
            scada,
            reanalysis,
            resources,
            composite: CompositeTable { resolution, rows },
        })
    }

    pub fn capacity_mw(&self) -> f64 {
        self.capacity_mw
    }

    pub fn resolution(&self) -> Resolution {
        self.composite.resolution
    }

    pub fn assets(&self) -> &AssetTable {
        &self.assets
    }

    pub fn meter(&self) -> &TimeSeriesTable {
        &self.meter
    }

    pub fn curtail(&self) -> &TimeSeriesTable {
        &self.curtail
    }

    pub fn scada(&self) -> &TimeSeriesTable {
        &self.scada
    }

    pub fn reanalysis_table(&self, source: &str) -> Option<&TimeSeriesTable> {
        self.reanalysis.get(source)
    }

    /// Aligned resource series for `source`.
    pub fn resource(&self, source: &str) -> Option<&dyn ResourceSeries> {
        self.resources.get(source).map(|s| s.as_ref())
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn composite(&self) -> &CompositeTable {
        &self.composite
    }
}

fn check_assets(assets: &AssetTable, scada: &TimeSeriesTable) -> Result<()> {
    let referenced: BTreeSet<&str> = scada
        .asset_ids()
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect();
    match referenced.into_iter().find(|id| !assets.contains(id)) {
        Some(id) => Err(AnalysisError::UnknownAsset {
            asset_id: id.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_overlap(
    meter: &TimeSeriesTable,
    curtail: &TimeSeriesTable,
    scada: &TimeSeriesTable,
) -> Result<()> {
    const TABLES: &str = "meter, curtail, scada";
    let coverage = |t: &TimeSeriesTable| {
        Coverage::of(t.timestamps()).ok_or_else(|| AnalysisError::InsufficientOverlap {
            tables: TABLES.to_string(),
            detail: format!("{} table has no rows", t.name()),
        })
    };
    let (m, c, s) = (coverage(meter)?, coverage(curtail)?, coverage(scada)?);
    let shared = m.intersect(&c).intersect(&s);
    if shared.contains_whole_month() {
        return Ok(());
    }
    Err(AnalysisError::InsufficientOverlap {
        tables: TABLES.to_string(),
        detail: format!(
            "meter {m}, curtail {c} and scada {s} share {shared}, which holds no whole calendar month"
        ),
    })
}

/// Per-period sums of one column with each period's completeness.
fn per_period(
    table: &TimeSeriesTable,
    role: Role,
    resolution: Resolution,
) -> Result<BTreeMap<NaiveDateTime, (f64, f64)>> {
    let values = table.values(role).ok_or_else(|| {
        AnalysisError::schema(table.name(), role.as_str(), "column was not validated")
    })?;
    let step = sampling_step(table.timestamps());
    Ok(
        resample_counted(resolution, table.timestamps(), values, Aggregation::Sum)
            .into_iter()
            .map(|(period, PeriodValue { value, samples })| {
                let expected = resolution.expected_samples(period, step);
                (period, (value, (samples as f64 / expected).min(1.0)))
            })
            .collect(),
    )
}

fn base_rows(
    capacity_mw: f64,
    resolution: Resolution,
    min_completeness: f64,
    meter: &TimeSeriesTable,
    curtail: &TimeSeriesTable,
) -> Result<Vec<CompositeRow>> {
    let net = per_period(meter, Role::NetEnergy, resolution)?;
    let availability = per_period(curtail, Role::AvailabilityLoss, resolution)?;
    let curtailment = per_period(curtail, Role::CurtailmentLoss, resolution)?;

    let mut rows = Vec::with_capacity(net.len());
    let mut incomplete = Vec::new();
    for (&period, &(net_energy_mwh, net_completeness)) in &net {
        let (
            Some(&(availability_loss_mwh, availability_completeness)),
            Some(&(curtailment_loss_mwh, curtailment_completeness)),
        ) = (availability.get(&period), curtailment.get(&period))
        else {
            continue;
        };
        let completeness = net_completeness
            .min(availability_completeness)
            .min(curtailment_completeness);
        if completeness < min_completeness {
            incomplete.push(period);
            continue;
        }
        let period_hours = resolution.period_hours(period);
        let nameplate_mwh = capacity_mw * period_hours;
        if net_energy_mwh > nameplate_mwh {
            warn!(
                %period,
                net_energy_mwh,
                nameplate_mwh,
                "net energy exceeds nameplate capacity for the period"
            );
        }
        let gross = net_energy_mwh + availability_loss_mwh + curtailment_loss_mwh;
        let fraction = |loss: f64| if gross > 0.0 { loss / gross } else { 0.0 };
        rows.push(CompositeRow {
            period,
            period_hours,
            net_energy_mwh,
            availability_loss_mwh,
            curtailment_loss_mwh,
            availability_loss_fraction: fraction(availability_loss_mwh),
            curtailment_loss_fraction: fraction(curtailment_loss_mwh),
            capacity_factor: net_energy_mwh / nameplate_mwh,
            completeness,
            resource: BTreeMap::new(),
        });
    }

    if let Some(first) = incomplete.first() {
        warn!(
            dropped = incomplete.len(),
            %first,
            min_completeness,
            "dropped incompletely logged periods from the composite table"
        );
    }
    if rows.is_empty() {
        return Err(AnalysisError::InsufficientOverlap {
            tables: "meter, curtail".to_string(),
            detail: format!(
                "no analysis period has both net energy and loss data logged to {:.0}% completeness",
                min_completeness * 100.0
            ),
        });
    }
    Ok(rows)
}
