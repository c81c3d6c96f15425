//! Column-name mapping from source tables to canonical roles.
//!
//! Each table category has its own struct enumerating the roles it
//! recognises, so a mapping is checked eagerly and never resolved by name
//! lookup at analysis time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical column roles understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Time,
    AssetId,
    Latitude,
    Longitude,
    NetEnergy,
    AvailabilityLoss,
    CurtailmentLoss,
    Power,
    WindSpeed,
    WindSpeedU,
    WindSpeedV,
    AirDensity,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::AssetId => "asset_id",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::NetEnergy => "net_energy",
            Self::AvailabilityLoss => "availability_loss",
            Self::CurtailmentLoss => "curtailment_loss",
            Self::Power => "power",
            Self::WindSpeed => "wind_speed",
            Self::WindSpeedU => "wind_speed_u",
            Self::WindSpeedV => "wind_speed_v",
            Self::AirDensity => "air_density",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of the energy columns in a meter or curtailment source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyUnit {
    Kwh,
    #[default]
    Mwh,
}

impl EnergyUnit {
    /// Multiplier converting this unit to MWh.
    pub fn to_mwh(self) -> f64 {
        match self {
            Self::Kwh => 1e-3,
            Self::Mwh => 1.0,
        }
    }
}

/// Per-turbine static attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetMapping {
    pub asset_id: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for AssetMapping {
    fn default() -> Self {
        Self {
            asset_id: "asset_id".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
        }
    }
}

/// Revenue meter: plant net energy per interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterMapping {
    pub time: String,
    pub net_energy: String,
    pub energy_unit: EnergyUnit,
}

impl Default for MeterMapping {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            net_energy: "net_energy".to_string(),
            energy_unit: EnergyUnit::default(),
        }
    }
}

/// Availability and curtailment loss log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurtailMapping {
    pub time: String,
    pub availability_loss: String,
    pub curtailment_loss: String,
    pub energy_unit: EnergyUnit,
}

impl Default for CurtailMapping {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            availability_loss: "availability_loss".to_string(),
            curtailment_loss: "curtailment_loss".to_string(),
            energy_unit: EnergyUnit::default(),
        }
    }
}

/// Turbine SCADA measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScadaMapping {
    pub time: String,
    pub asset_id: String,
    pub power: String,
    pub wind_speed: Option<String>,
}

impl Default for ScadaMapping {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            asset_id: "asset_id".to_string(),
            power: "power".to_string(),
            wind_speed: Some("wind_speed".to_string()),
        }
    }
}

/// One reanalysis source. Either `wind_speed` or both components must be mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReanalysisMapping {
    pub time: String,
    pub wind_speed: Option<String>,
    pub wind_speed_u: Option<String>,
    pub wind_speed_v: Option<String>,
    pub air_density: Option<String>,
}

impl Default for ReanalysisMapping {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            wind_speed: Some("wind_speed".to_string()),
            wind_speed_u: None,
            wind_speed_v: None,
            air_density: Some("air_density".to_string()),
        }
    }
}

impl ReanalysisMapping {
    /// Whether a scalar wind speed can be derived from the mapped columns.
    pub fn has_wind_speed(&self) -> bool {
        self.wind_speed.is_some() || (self.wind_speed_u.is_some() && self.wind_speed_v.is_some())
    }
}

/// Mapping for every table category of one plant. Sections absent from a
/// config file keep their canonical names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub asset: AssetMapping,
    pub meter: MeterMapping,
    pub curtail: CurtailMapping,
    pub scada: ScadaMapping,
    /// Keyed by reanalysis source name (e.g. `era5`, `merra2`).
    pub reanalysis: BTreeMap<String, ReanalysisMapping>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ColumnMapping {
    /// Canonical names with a single `era5` reanalysis source.
    pub fn canonical() -> Self {
        let mut reanalysis = BTreeMap::new();
        reanalysis.insert("era5".to_string(), ReanalysisMapping::default());
        Self {
            asset: AssetMapping::default(),
            meter: MeterMapping::default(),
            curtail: CurtailMapping::default(),
            scada: ScadaMapping::default(),
            reanalysis,
        }
    }

    /// Every mapped `(field path, column name)` pair, for emptiness checks.
    pub(crate) fn named_columns(&self) -> Vec<(String, &str)> {
        let mut out = vec![
            ("mapping.asset.asset_id".to_string(), self.asset.asset_id.as_str()),
            ("mapping.asset.latitude".to_string(), self.asset.latitude.as_str()),
            ("mapping.asset.longitude".to_string(), self.asset.longitude.as_str()),
            ("mapping.meter.time".to_string(), self.meter.time.as_str()),
            ("mapping.meter.net_energy".to_string(), self.meter.net_energy.as_str()),
            ("mapping.curtail.time".to_string(), self.curtail.time.as_str()),
            (
                "mapping.curtail.availability_loss".to_string(),
                self.curtail.availability_loss.as_str(),
            ),
            (
                "mapping.curtail.curtailment_loss".to_string(),
                self.curtail.curtailment_loss.as_str(),
            ),
            ("mapping.scada.time".to_string(), self.scada.time.as_str()),
            ("mapping.scada.asset_id".to_string(), self.scada.asset_id.as_str()),
            ("mapping.scada.power".to_string(), self.scada.power.as_str()),
        ];
        if let Some(ws) = &self.scada.wind_speed {
            out.push(("mapping.scada.wind_speed".to_string(), ws.as_str()));
        }
        for (name, m) in &self.reanalysis {
            let prefix = format!("mapping.reanalysis.{name}");
            out.push((format!("{prefix}.time"), m.time.as_str()));
            let optional = [
                ("wind_speed", &m.wind_speed),
                ("wind_speed_u", &m.wind_speed_u),
                ("wind_speed_v", &m.wind_speed_v),
                ("air_density", &m.air_density),
            ];
            for (field, column) in optional {
                if let Some(c) = column {
                    out.push((format!("{prefix}.{field}"), c.as_str()));
                }
            }
        }
        out
    }
}
