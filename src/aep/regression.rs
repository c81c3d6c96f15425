//! Capacity-factor-versus-resource regression and long-term projection.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{AepResult, SimulationIteration};
use crate::error::IterationError;
use crate::plant::PlantDataset;

/// Robust scale factor turning a median absolute deviation into a sigma.
const MAD_TO_SIGMA: f64 = 1.4826;
/// Relative spread below which a predictor is treated as constant.
const CONSTANT_TOLERANCE: f64 = 1e-9;
/// Pivot floor, relative to the observation count, for the normal equations.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Regression of period capacity factor on the wind resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RegressionForm {
    /// Ordinary least squares on wind speed.
    #[default]
    Ols,
    /// Ordinary least squares on wind speed and air density.
    OlsWithDensity,
}

impl RegressionForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ols => "ols",
            Self::OlsWithDensity => "ols_with_density",
        }
    }

    pub fn uses_density(&self) -> bool {
        matches!(self, Self::OlsWithDensity)
    }
}

impl fmt::Display for RegressionForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paired production/resource observation.
///
/// Production is a capacity factor, so periods of different length are
/// directly comparable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub wind_speed_ms: f64,
    pub air_density_kgm3: Option<f64>,
    pub capacity_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Predictor {
    WindSpeed,
    AirDensity,
}

impl Predictor {
    fn value(self, wind_speed_ms: f64, air_density_kgm3: Option<f64>) -> Option<f64> {
        match self {
            Self::WindSpeed => Some(wind_speed_ms),
            Self::AirDensity => air_density_kgm3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Term {
    predictor: Predictor,
    mean: f64,
    scale: f64,
    coefficient: f64,
}

/// Linear model of capacity factor fitted on standardised predictors.
///
/// Predictors with no spread in the sample are dropped, so a constant
/// resource collapses the model to the mean capacity factor.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    intercept: f64,
    terms: Vec<Term>,
    r_squared: f64,
    observations: usize,
}

impl LinearFit {
    /// Fits `form` to `observations`.
    ///
    /// # Errors
    ///
    /// `RegressionFit` when there are no observations, when the density form
    /// meets an observation without density, when the varying predictors are
    /// collinear, or when the coefficients are not finite.
    pub fn fit(observations: &[Observation], form: RegressionForm) -> Result<Self, IterationError> {
        let n = observations.len();
        if n == 0 {
            return Err(IterationError::fit("no observations to fit"));
        }
        let mut candidates = vec![Predictor::WindSpeed];
        if form.uses_density() {
            candidates.push(Predictor::AirDensity);
        }

        let mut columns: Vec<(Predictor, f64, f64, Vec<f64>)> = Vec::new();
        for predictor in candidates {
            let raw = observations
                .iter()
                .map(|o| predictor.value(o.wind_speed_ms, o.air_density_kgm3))
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| IterationError::fit("observation without air density"))?;
            let mean = raw.iter().sum::<f64>() / n as f64;
            let var = raw.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
            let scale = var.sqrt();
            if scale <= CONSTANT_TOLERANCE * mean.abs().max(1.0) {
                continue;
            }
            let z = raw.iter().map(|x| (x - mean) / scale).collect();
            columns.push((predictor, mean, scale, z));
        }

        let y_mean = observations.iter().map(|o| o.capacity_factor).sum::<f64>() / n as f64;
        let centred: Vec<f64> = observations.iter().map(|o| o.capacity_factor - y_mean).collect();

        // Centred design: the intercept is the mean and the slopes solve ZᵀZ b = Zᵀy.
        let k = columns.len();
        let mut gram = vec![vec![0.0; k]; k];
        let mut rhs = vec![0.0; k];
        for (i, (_, _, _, zi)) in columns.iter().enumerate() {
            rhs[i] = zi.iter().zip(&centred).map(|(a, b)| a * b).sum();
            for (j, (_, _, _, zj)) in columns.iter().enumerate() {
                gram[i][j] = zi.iter().zip(zj).map(|(a, b)| a * b).sum();
            }
        }
        let coefficients = solve(gram, rhs, PIVOT_TOLERANCE * n as f64).ok_or_else(|| {
            IterationError::fit("singular or ill-conditioned normal equations")
        })?;
        if !y_mean.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(IterationError::fit("non-finite regression coefficients"));
        }

        let terms: Vec<Term> = columns
            .iter()
            .zip(&coefficients)
            .map(|((predictor, mean, scale, _), &coefficient)| Term {
                predictor: *predictor,
                mean: *mean,
                scale: *scale,
                coefficient,
            })
            .collect();
        let mut fit = Self {
            intercept: y_mean,
            terms,
            r_squared: 0.0,
            observations: n,
        };

        let ss_tot: f64 = centred.iter().map(|d| d * d).sum();
        let ss_res: f64 = observations
            .iter()
            .map(|o| (o.capacity_factor - fit.predict(o.wind_speed_ms, o.air_density_kgm3)).powi(2))
            .sum();
        fit.r_squared = if ss_tot > 0.0 {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Ok(fit)
    }

    /// Predicted capacity factor. A missing density contributes its sample mean.
    pub fn predict(&self, wind_speed_ms: f64, air_density_kgm3: Option<f64>) -> f64 {
        self.intercept
            + self
                .terms
                .iter()
                .map(|t| {
                    t.predictor
                        .value(wind_speed_ms, air_density_kgm3)
                        .map_or(0.0, |x| t.coefficient * (x - t.mean) / t.scale)
                })
                .sum::<f64>()
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    /// Number of predictors kept after dropping constant ones.
    pub fn predictors(&self) -> usize {
        self.terms.len()
    }
}

/// Gaussian elimination with partial pivoting. `None` when a pivot falls below `tolerance`.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>, tolerance: f64) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < tolerance {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(f64::total_cmp);
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

/// Drops observations whose residual from a wind-speed-only fit lies more
/// than `threshold` robust sigmas from the median residual.
///
/// Nothing is dropped when the preliminary fit fails or the residual spread
/// is zero (up to rounding).
pub fn exclude_outliers(observations: &[Observation], threshold: f64) -> Vec<Observation> {
    let Ok(preliminary) = LinearFit::fit(observations, RegressionForm::Ols) else {
        return observations.to_vec();
    };
    let residuals: Vec<f64> = observations
        .iter()
        .map(|o| o.capacity_factor - preliminary.predict(o.wind_speed_ms, None))
        .collect();
    let centre = median(&mut residuals.clone());
    let mut deviations: Vec<f64> = residuals.iter().map(|r| (r - centre).abs()).collect();
    let mad = median(&mut deviations);
    // Residuals of an exact fit are rounding noise, not spread.
    let noise_floor = CONSTANT_TOLERANCE
        * observations
            .iter()
            .map(|o| o.capacity_factor.abs())
            .fold(1.0, f64::max);
    if mad <= noise_floor || !mad.is_finite() {
        return observations.to_vec();
    }
    let limit = threshold * MAD_TO_SIGMA * mad;
    observations
        .iter()
        .zip(&residuals)
        .filter(|(_, r)| (*r - centre).abs() <= limit)
        .map(|(o, _)| *o)
        .collect()
}

/// Produces one AEP estimate per iteration plan.
#[derive(Debug, Clone, Copy)]
pub struct AepRegressor<'a> {
    dataset: &'a PlantDataset,
    min_observations: usize,
}

impl<'a> AepRegressor<'a> {
    pub fn new(dataset: &'a PlantDataset, min_observations: usize) -> Self {
        Self {
            dataset,
            min_observations,
        }
    }

    /// Fits the iteration's model on its bootstrap sample and projects it onto
    /// the long-term record of its reanalysis source.
    ///
    /// The model predicts capacity factor; each long-term period contributes
    /// that factor times its own nameplate energy, so calendar length never
    /// enters the fit.
    ///
    /// Loss fractions are the means over the bootstrap rows. Bootstrap rows
    /// without a sample from the chosen source (or without density, for the
    /// density form) are not paired and do not count as observations.
    ///
    /// # Errors
    ///
    /// * `InsufficientData` if fewer than the minimum observations remain after
    ///   outlier exclusion
    /// * `RegressionFit` for a failed fit, an unknown source, an empty
    ///   long-term record, or combined losses of 100% or more
    pub fn estimate(&self, iteration: &SimulationIteration) -> Result<AepResult, IterationError> {
        let series = self.dataset.resource(&iteration.source).ok_or_else(|| {
            IterationError::fit(format!(
                "reanalysis source `{}` is not attached to the dataset",
                iteration.source
            ))
        })?;
        let rows = self.dataset.composite().rows();
        let form = iteration.regression_form;

        let mut observations = Vec::with_capacity(iteration.sample_indices.len());
        let (mut availability, mut curtailment, mut loss_rows) = (0.0, 0.0, 0_usize);
        for row in iteration.sample_indices.iter().filter_map(|&i| rows.get(i)) {
            availability += row.availability_loss_fraction;
            curtailment += row.curtailment_loss_fraction;
            loss_rows += 1;

            let Some(sample) = row.resource.get(&iteration.source) else {
                continue;
            };
            if form.uses_density() && sample.air_density_kgm3.is_none() {
                continue;
            }
            observations.push(Observation {
                wind_speed_ms: sample.wind_speed_ms,
                air_density_kgm3: sample.air_density_kgm3,
                capacity_factor: row.capacity_factor * iteration.meter_factor,
            });
        }

        let kept = exclude_outliers(&observations, iteration.outlier_threshold);
        if kept.len() < self.min_observations {
            return Err(IterationError::InsufficientData {
                observed: kept.len(),
                required: self.min_observations,
            });
        }
        let fit = LinearFit::fit(&kept, form)?;

        let long_term = match iteration.long_term_years {
            Some(years) => series.trailing_years(years),
            None => series.samples(),
        };
        if long_term.is_empty() {
            return Err(IterationError::fit("empty long-term reanalysis record"));
        }
        let resolution = self.dataset.resolution();
        let capacity_mw = self.dataset.capacity_mw();
        let projected: f64 = long_term
            .iter()
            .map(|s| {
                let nameplate_mwh = capacity_mw * resolution.period_hours(s.period);
                fit.predict(s.wind_speed_ms, s.air_density_kgm3)
                    .clamp(0.0, 1.0)
                    * nameplate_mwh
            })
            .sum();
        let net_aep_mwh = projected / long_term.len() as f64 * resolution.periods_per_year();

        let per_row = |sum: f64| {
            (sum / loss_rows.max(1) as f64 * iteration.loss_factor).clamp(0.0, 1.0)
        };
        let availability_loss_fraction = per_row(availability);
        let curtailment_loss_fraction = per_row(curtailment);
        let retained = 1.0 - availability_loss_fraction - curtailment_loss_fraction;
        if retained <= 0.0 {
            return Err(IterationError::fit(format!(
                "combined loss fraction {:.3} leaves no production",
                1.0 - retained
            )));
        }
        let aep_mwh = (net_aep_mwh / retained).clamp(0.0, capacity_mw * 8760.0);
        if !aep_mwh.is_finite() {
            return Err(IterationError::fit("non-finite AEP estimate"));
        }

        Ok(AepResult {
            aep_mwh,
            availability_loss_fraction,
            curtailment_loss_fraction,
            r_squared: fit.r_squared(),
            observations: kept.len(),
            long_term_periods: long_term.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(ws: f64, rho: Option<f64>, response: f64) -> Observation {
        Observation {
            wind_speed_ms: ws,
            air_density_kgm3: rho,
            capacity_factor: response,
        }
    }

    #[test]
    fn recovers_exact_linear_relationship() {
        let data: Vec<Observation> = (0..12)
            .map(|i| {
                let ws = 4.0 + i as f64 * 0.5;
                obs(ws, None, 500.0 * ws - 1000.0)
            })
            .collect();
        let fit = LinearFit::fit(&data, RegressionForm::Ols).expect("fit");
        assert!((fit.predict(8.0, None) - 3000.0).abs() < 1e-6);
        assert!((fit.r_squared() - 1.0).abs() < 1e-12);
        assert_eq!(fit.predictors(), 1);
    }

    #[test]
    fn constant_wind_speed_reduces_to_mean() {
        let data: Vec<Observation> = [2900.0, 3000.0, 3100.0]
            .iter()
            .map(|&e| obs(7.0, Some(1.225), e))
            .collect();
        let fit = LinearFit::fit(&data, RegressionForm::OlsWithDensity).expect("fit");
        assert_eq!(fit.predictors(), 0);
        assert!((fit.predict(12.0, Some(1.1)) - 3000.0).abs() < 1e-9);
    }

    #[test]
    fn density_covariate_is_used_when_independent() {
        let mut data = Vec::new();
        for i in 0..6 {
            for j in 0..3 {
                let ws = 5.0 + i as f64;
                let rho = 1.18 + 0.03 * j as f64;
                data.push(obs(ws, Some(rho), 400.0 * ws + 2000.0 * rho));
            }
        }
        let fit = LinearFit::fit(&data, RegressionForm::OlsWithDensity).expect("fit");
        assert_eq!(fit.predictors(), 2);
        let expected = 400.0 * 7.5 + 2000.0 * 1.2;
        assert!((fit.predict(7.5, Some(1.2)) - expected).abs() < 1e-6);
    }

    #[test]
    fn collinear_density_is_a_fit_error() {
        let data: Vec<Observation> = (0..12)
            .map(|i| {
                let ws = 4.0 + i as f64;
                obs(ws, Some(1.0 + 0.01 * ws), 300.0 * ws)
            })
            .collect();
        let err = LinearFit::fit(&data, RegressionForm::OlsWithDensity).unwrap_err();
        assert_eq!(err.kind(), "regression_fit");
    }

    #[test]
    fn density_form_requires_density() {
        let data = vec![obs(5.0, None, 100.0), obs(6.0, Some(1.2), 200.0)];
        assert!(LinearFit::fit(&data, RegressionForm::OlsWithDensity).is_err());
        assert!(LinearFit::fit(&data, RegressionForm::Ols).is_ok());
    }

    #[test]
    fn gross_outlier_is_excluded() {
        let mut data: Vec<Observation> = (0..20)
            .map(|i| {
                let ws = 5.0 + 0.2 * i as f64;
                let wiggle = if i % 2 == 0 { 15.0 } else { -15.0 };
                obs(ws, None, 400.0 * ws + wiggle)
            })
            .collect();
        data.push(obs(7.0, None, 9000.0));
        let kept = exclude_outliers(&data, 3.0);
        assert_eq!(kept.len(), 20);
        assert!(kept.iter().all(|o| o.capacity_factor < 9000.0));
    }

    #[test]
    fn zero_spread_residuals_exclude_nothing() {
        let data: Vec<Observation> = (0..10).map(|i| obs(i as f64, None, 2.0 * i as f64)).collect();
        assert_eq!(exclude_outliers(&data, 2.0).len(), 10);
    }

    #[test]
    fn solver_rejects_singular_system() {
        let singular = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve(singular, vec![1.0, 2.0], 1e-10).is_none());
        let x = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0], 1e-10).expect("solvable");
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }
}
