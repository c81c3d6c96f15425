//! Per-iteration random streams and the draws made from them.
//!
//! Every iteration owns a `StdRng` seeded from the master seed and its index,
//! so a draw never depends on which worker ran which iteration first.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Weyl increment used by splitmix64.
const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of iteration `index`: the `index + 1`-th splitmix64 output after `master_seed`.
pub fn iteration_seed(master_seed: u64, index: usize) -> u64 {
    let step = (index as u64).wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    mix64(master_seed.wrapping_add(step))
}

pub fn iteration_rng(master_seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(iteration_seed(master_seed, index))
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation.
/// Always consumes two draws so the stream position does not depend on `std_dev`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    if std_dev <= 0.0 {
        return 0.0;
    }
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// `n` indices drawn uniformly from `0..n` with replacement.
pub fn bootstrap_indices(rng: &mut StdRng, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..n).map(|_| rng.random_range(0..n)).collect()
}

/// Uniform draw from `[lo, hi]`. Consumes one draw even when the range is a point.
pub fn uniform_in(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    let u: f64 = rng.random();
    if hi > lo { lo + u * (hi - lo) } else { lo }
}
