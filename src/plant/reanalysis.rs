//! Reanalysis alignment onto the plant's analysis resolution.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Months, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::period::{Aggregation, Resolution, resample};
use crate::error::{AnalysisError, Result};
use crate::schema::{Role, TimeSeriesTable};

/// Wind resource of one reanalysis source for one analysis period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub period: NaiveDateTime,
    pub wind_speed_ms: f64,
    pub air_density_kgm3: Option<f64>,
}

/// Long-term average of one source over its full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReanalysisNormal {
    pub source: String,
    pub wind_speed_ms: f64,
    pub air_density_kgm3: Option<f64>,
    /// Number of periods averaged.
    pub periods: usize,
}

/// Capability shared by every reanalysis source attached to a dataset.
///
/// The Monte Carlo engine only sees sources through this trait, so the
/// number and kind of sources is not fixed at compile time.
pub trait ResourceSeries: Send + Sync + fmt::Debug {
    fn source(&self) -> &str;

    /// Per-period samples over the full record, sorted by period.
    fn samples(&self) -> &[ResourceSample];

    fn normal(&self) -> &ReanalysisNormal;

    fn sample_at(&self, period: NaiveDateTime) -> Option<&ResourceSample> {
        let samples = self.samples();
        samples
            .binary_search_by_key(&period, |s| s.period)
            .ok()
            .map(|i| &samples[i])
    }

    /// Samples within the last `years` years of the record. The whole record
    /// is returned when it is shorter than that.
    fn trailing_years(&self, years: u32) -> &[ResourceSample] {
        let samples = self.samples();
        let Some(last) = samples.last() else {
            return samples;
        };
        match last
            .period
            .checked_sub_months(Months::new(years.saturating_mul(12)))
        {
            Some(cutoff) => {
                let start = samples.partition_point(|s| s.period <= cutoff);
                &samples[start..]
            }
            None => samples,
        }
    }
}

/// A reanalysis source resampled to the analysis resolution.
#[derive(Debug, Clone)]
pub struct AlignedReanalysis {
    source: String,
    samples: Vec<ResourceSample>,
    normal: ReanalysisNormal,
}

impl ResourceSeries for AlignedReanalysis {
    fn source(&self) -> &str {
        &self.source
    }

    fn samples(&self) -> &[ResourceSample] {
        &self.samples
    }

    fn normal(&self) -> &ReanalysisNormal {
        &self.normal
    }
}

/// Aligns reanalysis tables independently of one another.
#[derive(Debug, Clone, Copy)]
pub struct ReanalysisAligner {
    resolution: Resolution,
}

impl ReanalysisAligner {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Derives scalar wind speed, averages each period, and computes the
    /// long-term normal over the full history of the source.
    ///
    /// # Errors
    ///
    /// `ReanalysisAlignment` if no period has a usable wind speed.
    pub fn align(&self, source: &str, table: &TimeSeriesTable) -> Result<AlignedReanalysis> {
        let speeds = scalar_wind_speed(table);
        let wind = resample(
            self.resolution,
            table.timestamps(),
            &speeds,
            Aggregation::Mean,
        );
        if wind.is_empty() {
            return Err(AnalysisError::ReanalysisAlignment {
                source_name: source.to_string(),
                reason: "no period has a usable wind speed".to_string(),
            });
        }
        let density = table
            .values(Role::AirDensity)
            .map(|d| resample(self.resolution, table.timestamps(), d, Aggregation::Mean))
            .unwrap_or_default();

        let samples: Vec<ResourceSample> = wind
            .into_iter()
            .map(|(period, wind_speed_ms)| ResourceSample {
                period,
                wind_speed_ms,
                air_density_kgm3: density.get(&period).copied(),
            })
            .collect();
        let normal = long_term_normal(source, &samples);
        debug!(
            source,
            periods = samples.len(),
            wind_speed_ms = normal.wind_speed_ms,
            "aligned reanalysis source"
        );

        Ok(AlignedReanalysis {
            source: source.to_string(),
            samples,
            normal,
        })
    }

    /// Aligns every source and checks each against the measurement periods.
    ///
    /// # Errors
    ///
    /// `ReanalysisAlignment` if a source shares no period with
    /// `measurement_periods`.
    pub fn align_all(
        &self,
        tables: &BTreeMap<String, TimeSeriesTable>,
        measurement_periods: &[NaiveDateTime],
    ) -> Result<BTreeMap<String, Box<dyn ResourceSeries>>> {
        let mut aligned: BTreeMap<String, Box<dyn ResourceSeries>> = BTreeMap::new();
        for (source, table) in tables {
            let series = self.align(source, table)?;
            let shared = measurement_periods
                .iter()
                .filter(|p| series.sample_at(**p).is_some())
                .count();
            if shared == 0 {
                return Err(AnalysisError::ReanalysisAlignment {
                    source_name: source.clone(),
                    reason: "no temporal overlap with the plant measurement window".to_string(),
                });
            }
            if shared * 2 < measurement_periods.len() {
                warn!(
                    source = source.as_str(),
                    shared,
                    measured = measurement_periods.len(),
                    "reanalysis source covers less than half of the measured periods"
                );
            }
            aligned.insert(source.clone(), Box::new(series));
        }
        Ok(aligned)
    }
}

/// Scalar wind speed per row: the mapped magnitude, else `sqrt(u² + v²)`.
fn scalar_wind_speed(table: &TimeSeriesTable) -> Vec<Option<f64>> {
    let direct = table.values(Role::WindSpeed);
    let u = table.values(Role::WindSpeedU);
    let v = table.values(Role::WindSpeedV);
    (0..table.len())
        .map(|i| {
            direct.and_then(|c| c[i]).or_else(|| {
                match (u.and_then(|c| c[i]), v.and_then(|c| c[i])) {
                    (Some(u), Some(v)) => Some(u.hypot(v)),
                    _ => None,
                }
            })
        })
        .collect()
}

fn long_term_normal(source: &str, samples: &[ResourceSample]) -> ReanalysisNormal {
    let n = samples.len();
    let wind_speed_ms = samples.iter().map(|s| s.wind_speed_ms).sum::<f64>() / n.max(1) as f64;
    let densities: Vec<f64> = samples.iter().filter_map(|s| s.air_density_kgm3).collect();
    let air_density_kgm3 = (!densities.is_empty())
        .then(|| densities.iter().sum::<f64>() / densities.len() as f64);
    ReanalysisNormal {
        source: source.to_string(),
        wind_speed_ms,
        air_density_kgm3,
        periods: n,
    }
}
