//! TOML-based analysis configuration and preset definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aep::RegressionForm;
use crate::plant::Resolution;
use crate::schema::{
    AssetMapping, ColumnMapping, CurtailMapping, EnergyUnit, MeterMapping, ReanalysisMapping,
    ScadaMapping,
};

/// Top-level analysis configuration parsed from TOML.
///
/// All fields have defaults matching the baseline preset. Load from
/// TOML with [`AnalysisConfig::from_toml_file`] or use
/// [`AnalysisConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Monte Carlo run parameters.
    #[serde(default)]
    pub analysis: MonteCarloConfig,
    /// Plant-level constants.
    #[serde(default)]
    pub plant: PlantConfig,
    /// Source column names per table category.
    #[serde(default = "ColumnMapping::canonical")]
    pub mapping: ColumnMapping,
    /// Input file locations, used by the CLI and API loaders only.
    #[serde(default)]
    pub data: DataConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Monte Carlo run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonteCarloConfig {
    /// Number of iterations (must be > 0).
    pub num_simulations: usize,
    /// Master seed every iteration seed is derived from.
    pub master_seed: u64,
    /// Composite table period.
    pub aggregation_resolution: Resolution,
    /// Share (0.0–1.0) of expected meter and loss samples a period needs to
    /// enter the composite table.
    pub min_period_completeness: f64,
    /// Paired observations an iteration needs after outlier exclusion.
    pub min_observations_per_iteration: usize,
    /// Largest tolerated share of failed iterations (0.0–1.0).
    pub max_failed_iteration_fraction: f64,
    /// Reanalysis sources drawn from, one per iteration.
    pub reanalysis_sources: Vec<String>,
    /// Optional selection weights keyed by source; missing sources weigh 1.
    pub reanalysis_weights: BTreeMap<String, f64>,
    /// Regression forms drawn from uniformly.
    pub regression_forms: Vec<RegressionForm>,
    /// Outlier threshold range in robust sigmas, `[lo, hi]`.
    pub outlier_threshold_range: [f64; 2],
    /// Trailing years of reanalysis projected onto, drawn from `[lo, hi]`.
    pub long_term_years: Option<[u32; 2]>,
    /// Standard deviation of the multiplicative meter perturbation.
    pub meter_uncertainty: f64,
    /// Standard deviation of the multiplicative loss perturbation.
    pub loss_uncertainty: f64,
    /// AEP percentiles to report (0–100).
    pub percentiles: Vec<f64>,
    /// Worker threads; `None` uses the global rayon pool.
    pub workers: Option<usize>,
    /// Run iterations on worker threads. Results do not depend on this.
    pub parallel: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 100,
            master_seed: 42,
            aggregation_resolution: Resolution::Monthly,
            min_period_completeness: 0.99,
            min_observations_per_iteration: 12,
            max_failed_iteration_fraction: 0.5,
            reanalysis_sources: vec!["era5".to_string()],
            reanalysis_weights: BTreeMap::new(),
            regression_forms: vec![RegressionForm::Ols],
            outlier_threshold_range: [2.0, 3.0],
            long_term_years: None,
            meter_uncertainty: 0.0,
            loss_uncertainty: 0.0,
            percentiles: vec![5.0, 50.0, 95.0],
            workers: None,
            parallel: true,
        }
    }
}

impl MonteCarloConfig {
    /// Selection weight of each configured source, in `reanalysis_sources` order.
    pub fn source_weights(&self) -> Vec<f64> {
        self.reanalysis_sources
            .iter()
            .map(|s| self.reanalysis_weights.get(s).copied().unwrap_or(1.0))
            .collect()
    }
}

/// Plant-level constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantConfig {
    /// Nameplate capacity (MW, > 0).
    pub capacity_mw: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self { capacity_mw: 10.0 }
    }
}

/// Input CSV locations. Relative paths resolve against `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub asset: PathBuf,
    pub meter: PathBuf,
    /// Curtailment table; the meter file when absent.
    pub curtail: Option<PathBuf>,
    pub scada: PathBuf,
    /// Reanalysis files keyed by source name.
    pub reanalysis: BTreeMap<String, PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let mut reanalysis = BTreeMap::new();
        reanalysis.insert("era5".to_string(), PathBuf::from("era5.csv"));
        Self {
            dir: PathBuf::from("data"),
            asset: PathBuf::from("asset.csv"),
            meter: PathBuf::from("meter.csv"),
            curtail: None,
            scada: PathBuf::from("scada.csv"),
            reanalysis,
        }
    }
}

impl DataConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }

    pub fn curtail_path(&self) -> PathBuf {
        self.resolve(self.curtail.as_deref().unwrap_or(&self.meter))
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log output settings. `AEP_LOG` and `RUST_LOG` override `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"analysis.num_simulations"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl AnalysisConfig {
    /// Returns the baseline configuration: canonical column names, one `era5` source.
    pub fn baseline() -> Self {
        Self {
            analysis: MonteCarloConfig::default(),
            plant: PlantConfig::default(),
            mapping: ColumnMapping::canonical(),
            data: DataConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Returns the La Haute Borne preset: the reference plant's column names,
    /// kWh meter data doubling as the curtailment log, ERA5 and MERRA-2.
    pub fn la_haute_borne() -> Self {
        let reanalysis_mapping = |height: &str, ws: &str, density: &str| ReanalysisMapping {
            time: "datetime".to_string(),
            wind_speed: Some(ws.to_string()),
            wind_speed_u: Some(format!("u_{height}")),
            wind_speed_v: Some(format!("v_{height}")),
            air_density: Some(density.to_string()),
        };
        let mut reanalysis = BTreeMap::new();
        reanalysis.insert(
            "era5".to_string(),
            reanalysis_mapping("100", "ws_100m", "dens_100m"),
        );
        reanalysis.insert(
            "merra2".to_string(),
            reanalysis_mapping("50", "ws_50m", "dens_50m"),
        );

        let mut files = BTreeMap::new();
        files.insert(
            "era5".to_string(),
            PathBuf::from("era5_wind_la_haute_borne.csv"),
        );
        files.insert(
            "merra2".to_string(),
            PathBuf::from("merra2_la_haute_borne.csv"),
        );

        Self {
            analysis: MonteCarloConfig {
                num_simulations: 10,
                reanalysis_sources: vec!["era5".to_string(), "merra2".to_string()],
                ..MonteCarloConfig::default()
            },
            plant: PlantConfig { capacity_mw: 8.2 },
            mapping: ColumnMapping {
                asset: AssetMapping {
                    asset_id: "Wind_turbine_name".to_string(),
                    latitude: "Latitude".to_string(),
                    longitude: "Longitude".to_string(),
                },
                meter: MeterMapping {
                    time: "time_utc".to_string(),
                    net_energy: "net_energy_kwh".to_string(),
                    energy_unit: EnergyUnit::Kwh,
                },
                curtail: CurtailMapping {
                    time: "time_utc".to_string(),
                    availability_loss: "availability_kwh".to_string(),
                    curtailment_loss: "curtailment_kwh".to_string(),
                    energy_unit: EnergyUnit::Kwh,
                },
                scada: ScadaMapping {
                    time: "Date_time".to_string(),
                    asset_id: "Wind_turbine_name".to_string(),
                    power: "P_avg".to_string(),
                    wind_speed: Some("Ws_avg".to_string()),
                },
                reanalysis,
            },
            data: DataConfig {
                dir: PathBuf::from("data/la_haute_borne"),
                asset: PathBuf::from("la-haute-borne_asset_table.csv"),
                meter: PathBuf::from("plant_data.csv"),
                curtail: None,
                scada: PathBuf::from("la-haute-borne-data-2014-2015.csv"),
                reanalysis: files,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "la_haute_borne"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "la_haute_borne" => Ok(Self::la_haute_borne()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let a = &self.analysis;

        if a.num_simulations == 0 {
            errors.push(ConfigError::new("analysis.num_simulations", "must be > 0"));
        }
        if a.min_observations_per_iteration == 0 {
            errors.push(ConfigError::new(
                "analysis.min_observations_per_iteration",
                "must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&a.min_period_completeness) {
            errors.push(ConfigError::new(
                "analysis.min_period_completeness",
                "must be in [0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&a.max_failed_iteration_fraction) {
            errors.push(ConfigError::new(
                "analysis.max_failed_iteration_fraction",
                "must be in [0.0, 1.0]",
            ));
        }

        if a.reanalysis_sources.is_empty() {
            errors.push(ConfigError::new(
                "analysis.reanalysis_sources",
                "must name at least one source",
            ));
        }
        if has_duplicates(&a.reanalysis_sources) {
            errors.push(ConfigError::new(
                "analysis.reanalysis_sources",
                "must not repeat a source",
            ));
        }
        for source in &a.reanalysis_sources {
            match self.mapping.reanalysis.get(source) {
                None => errors.push(ConfigError::new(
                    "analysis.reanalysis_sources",
                    format!("source \"{source}\" has no [mapping.reanalysis.{source}] section"),
                )),
                Some(m) if a.regression_forms.iter().any(|f| f.uses_density())
                    && m.air_density.is_none() =>
                {
                    errors.push(ConfigError::new(
                        "analysis.regression_forms",
                        format!("ols_with_density needs air_density mapped for \"{source}\""),
                    ));
                }
                Some(_) => {}
            }
        }

        for (source, &w) in &a.reanalysis_weights {
            let field = format!("analysis.reanalysis_weights.{source}");
            if !a.reanalysis_sources.contains(source) {
                errors.push(ConfigError::new(&field, "is not a selected reanalysis source"));
            }
            if !w.is_finite() || w < 0.0 {
                errors.push(ConfigError::new(&field, "must be finite and >= 0"));
            }
        }
        if !a.reanalysis_weights.is_empty() && a.source_weights().iter().sum::<f64>() <= 0.0 {
            errors.push(ConfigError::new(
                "analysis.reanalysis_weights",
                "selected sources must have a positive total weight",
            ));
        }

        if a.regression_forms.is_empty() {
            errors.push(ConfigError::new(
                "analysis.regression_forms",
                "must name at least one form",
            ));
        }
        if has_duplicates(&a.regression_forms) {
            errors.push(ConfigError::new(
                "analysis.regression_forms",
                "must not repeat a form",
            ));
        }

        let [lo, hi] = a.outlier_threshold_range;
        if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
            errors.push(ConfigError::new(
                "analysis.outlier_threshold_range",
                "must satisfy 0 < lo <= hi",
            ));
        }
        if let Some([lo, hi]) = a.long_term_years {
            if lo == 0 || lo > hi {
                errors.push(ConfigError::new(
                    "analysis.long_term_years",
                    "must satisfy 1 <= lo <= hi",
                ));
            }
        }
        for (field, sigma) in [
            ("analysis.meter_uncertainty", a.meter_uncertainty),
            ("analysis.loss_uncertainty", a.loss_uncertainty),
        ] {
            if !sigma.is_finite() || sigma < 0.0 {
                errors.push(ConfigError::new(field, "must be finite and >= 0"));
            }
        }
        if a.percentiles.iter().any(|p| !(0.0..=100.0).contains(p)) {
            errors.push(ConfigError::new(
                "analysis.percentiles",
                "must lie in [0, 100]",
            ));
        }
        if a.workers == Some(0) {
            errors.push(ConfigError::new("analysis.workers", "must be > 0"));
        }

        let cap = self.plant.capacity_mw;
        if !cap.is_finite() || cap <= 0.0 {
            errors.push(ConfigError::new("plant.capacity_mw", "must be finite and > 0"));
        }

        for (name, m) in &self.mapping.reanalysis {
            if !m.has_wind_speed() {
                errors.push(ConfigError::new(
                    format!("mapping.reanalysis.{name}"),
                    "must map wind_speed or both wind_speed_u and wind_speed_v",
                ));
            }
        }
        for (field, column) in self.mapping.named_columns() {
            if column.trim().is_empty() {
                errors.push(ConfigError::new(field, "column name must not be empty"));
            }
        }

        errors
    }
}

fn has_duplicates<T: Ord>(items: &[T]) -> bool {
    items.iter().collect::<BTreeSet<_>>().len() != items.len()
}
