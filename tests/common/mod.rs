//! Shared synthetic-plant fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use wind_aep::analysis::AnalysisInputs;
use wind_aep::config::AnalysisConfig;
use wind_aep::io::load::read_csv;
use wind_aep::schema::RawTable;

/// First reanalysis year; the record spans 20 years.
pub const REANALYSIS_START: i32 = 1996;
/// Reanalysis months (1996-01 through 2015-12).
pub const REANALYSIS_MONTHS: u32 = 240;
/// Month index of the first measured month (2014-01).
pub const MEASURED_START: u32 = 216;

/// Steady output (MW) giving 36000 MWh over an average 8766-hour year.
pub const STEADY_MW: f64 = 36_000.0 / 8766.0;

/// `YYYY-MM-01` of month `index` counted from January 1996.
pub fn month(index: u32) -> String {
    let year = REANALYSIS_START + (index / 12) as i32;
    format!("{year}-{:02}-01", index % 12 + 1)
}

/// Midnight starting month `index`.
pub fn month_start(index: u32) -> NaiveDateTime {
    let year = REANALYSIS_START + (index / 12) as i32;
    NaiveDate::from_ymd_opt(year, index % 12 + 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid month")
}

/// Length of month `index` in hours.
pub fn month_hours(index: u32) -> f64 {
    (month_start(index + 1) - month_start(index)).num_hours() as f64
}

/// A monthly plant whose energy is a function of reanalysis wind speed.
pub struct SyntheticPlant {
    pub measured_months: u32,
    /// Reanalysis wind speed (m/s) of month `index`.
    pub wind: fn(u32) -> f64,
    /// Net energy (MWh) of month `index` given its wind speed.
    pub energy_mwh: fn(f64, u32) -> f64,
    pub availability_mwh: f64,
    pub curtailment_mwh: f64,
}

impl Default for SyntheticPlant {
    /// Noisy linear plant: about 2 GWh a month at 7 m/s.
    fn default() -> Self {
        Self {
            measured_months: 24,
            wind: |i| 6.0 + f64::from((i * 7 + 3) % 11) * 0.2,
            energy_mwh: |ws, i| 600.0 * ws - 2200.0 + (f64::from((i * 37) % 13) - 6.0) * 30.0,
            availability_mwh: 40.0,
            curtailment_mwh: 15.0,
        }
    }
}

impl SyntheticPlant {
    /// The constant plant: a steady [`STEADY_MW`] (3000 MWh in an average
    /// month), no losses, 7 m/s forever.
    pub fn constant() -> Self {
        Self {
            measured_months: 24,
            wind: |_| 7.0,
            energy_mwh: |_, i| STEADY_MW * month_hours(i),
            availability_mwh: 0.0,
            curtailment_mwh: 0.0,
        }
    }

    /// Exactly 3000 MWh in every calendar month, no losses, 7 m/s forever.
    pub fn fixed_monthly() -> Self {
        Self {
            energy_mwh: |_, _| 3000.0,
            ..Self::constant()
        }
    }

    fn measured(&self) -> std::ops::Range<u32> {
        MEASURED_START..MEASURED_START + self.measured_months
    }

    /// Tables with canonical column names and MWh energies.
    pub fn inputs(&self) -> AnalysisInputs {
        let mut meter = String::from("time,net_energy\n");
        let mut curtail = String::from("time,availability_loss,curtailment_loss\n");
        let mut scada = String::from("time,asset_id,power,wind_speed\n");
        for i in self.measured() {
            let ws = (self.wind)(i);
            let t = month(i);
            let _ = writeln!(meter, "{t},{}", (self.energy_mwh)(ws, i));
            let _ = writeln!(
                curtail,
                "{t},{},{}",
                self.availability_mwh, self.curtailment_mwh
            );
            for turbine in ["T1", "T2"] {
                let _ = writeln!(scada, "{t},{turbine},1500,{ws}");
            }
        }
        let mut era5 = String::from("time,wind_speed,air_density\n");
        for i in 0..REANALYSIS_MONTHS {
            let _ = writeln!(era5, "{},{},1.22", month(i), (self.wind)(i));
        }

        AnalysisInputs {
            asset: table("asset_id,latitude,longitude\nT1,48.45,5.59\nT2,48.46,5.60\n"),
            meter: table(&meter),
            curtail: table(&curtail),
            scada: table(&scada),
            reanalysis: BTreeMap::from([("era5".to_string(), table(&era5))]),
        }
    }

    /// Like [`inputs`](Self::inputs), with meter and losses logged hourly.
    /// Each month's energy is spread evenly over its hours.
    pub fn hourly_inputs(&self) -> AnalysisInputs {
        let mut inputs = self.inputs();
        let mut meter = RawTable::with_headers(&["time", "net_energy"]);
        let mut curtail =
            RawTable::with_headers(&["time", "availability_loss", "curtailment_loss"]);
        for i in self.measured() {
            let hours = month_hours(i);
            let energy = (self.energy_mwh)((self.wind)(i), i) / hours;
            let availability = self.availability_mwh / hours;
            let curtailment = self.curtailment_mwh / hours;
            for h in 0..hours as i64 {
                let t = (month_start(i) + Duration::hours(h))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string();
                meter.push_row(vec![t.clone(), energy.to_string()]);
                curtail.push_row(vec![t, availability.to_string(), curtailment.to_string()]);
            }
        }
        inputs.meter = meter;
        inputs.curtail = curtail;
        inputs
    }

    /// One reanalysis row per day over the whole record, each day carrying
    /// its month's wind speed.
    pub fn daily_reanalysis(&self) -> RawTable {
        let mut era5 = RawTable::with_headers(&["time", "wind_speed", "air_density"]);
        for i in 0..REANALYSIS_MONTHS {
            let ws = (self.wind)(i).to_string();
            let days = (month_hours(i) / 24.0) as i64;
            for d in 0..days {
                let t = (month_start(i) + Duration::days(d)).format("%Y-%m-%d").to_string();
                era5.push_row(vec![t, ws.clone(), "1.22".to_string()]);
            }
        }
        era5
    }

    /// Writes the plant as the La Haute Borne files (kWh energies, ERA5 and
    /// MERRA-2 with wind components) into `dir`.
    pub fn write_la_haute_borne(&self, dir: &Path) {
        let mut plant = String::from("time_utc,net_energy_kwh,availability_kwh,curtailment_kwh\n");
        let mut scada = String::from("Wind_turbine_name,Date_time,P_avg,Ws_avg\n");
        for i in self.measured() {
            let ws = (self.wind)(i);
            let t = month(i);
            let _ = writeln!(
                plant,
                "{t}T00:00:00+00:00,{},{},{}",
                (self.energy_mwh)(ws, i) * 1000.0,
                self.availability_mwh * 1000.0,
                self.curtailment_mwh * 1000.0
            );
            for turbine in ["R80711", "R80790"] {
                let _ = writeln!(scada, "{turbine},{t} 00:00:00,1500,{ws}");
            }
        }

        let reanalysis = |height: &str, ws_col: &str, dens_col: &str, scale: f64| {
            let mut out = format!("datetime,{ws_col},u_{height},v_{height},{dens_col}\n");
            for i in 0..REANALYSIS_MONTHS {
                let ws = (self.wind)(i) * scale;
                // 3-4-5 triangle so the components reproduce `ws` exactly.
                let _ = writeln!(
                    out,
                    "{} 00:00:00,{ws},{},{},1.21",
                    month(i),
                    0.6 * ws,
                    0.8 * ws
                );
            }
            out
        };

        let files = [
            (
                "la-haute-borne_asset_table.csv",
                "Wind_turbine_name,Latitude,Longitude\nR80711,48.45,5.59\nR80790,48.46,5.60\n"
                    .to_string(),
            ),
            ("plant_data.csv", plant),
            ("la-haute-borne-data-2014-2015.csv", scada),
            (
                "era5_wind_la_haute_borne.csv",
                reanalysis("100", "ws_100m", "dens_100m", 1.0),
            ),
            (
                "merra2_la_haute_borne.csv",
                reanalysis("50", "ws_50m", "dens_50m", 0.95),
            ),
        ];
        for (name, content) in files {
            fs::write(dir.join(name), content).expect("write fixture file");
        }
    }
}

pub fn table(text: &str) -> RawTable {
    read_csv(text.as_bytes()).expect("fixture CSV is valid")
}

/// Baseline config with `n` iterations and the given master seed.
pub fn config(n: usize, seed: u64) -> AnalysisConfig {
    let mut config = AnalysisConfig::baseline();
    config.analysis.num_simulations = n;
    config.analysis.master_seed = seed;
    config
}
