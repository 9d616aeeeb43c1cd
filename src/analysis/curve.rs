//! Tabulated CDF of `Z = X * Y` against its empirical and Gaussian counterparts.

use rayon::prelude::*;

use crate::core::DistributionPair;
use crate::engines::ForwardCdfEngine;
use crate::math::normal_pdf;
use crate::mc::MonteCarloValidator;

/// Grid and sample sizes for [`sample_curve`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CurveSpec {
    pub n_points: usize,
    /// Grid half-width around `mu_z` in multiples of `sigma_z`.
    pub range_sigmas: f64,
    /// Monte Carlo draws for the empirical CDF; 0 skips it.
    pub mc_samples: usize,
}

impl Default for CurveSpec {
    fn default() -> Self {
        Self {
            n_points: 1_000,
            range_sigmas: 4.0,
            mc_samples: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CdfCurve {
    pub z: Vec<f64>,
    pub analytic: Vec<f64>,
    /// Empty when `mc_samples` is 0.
    pub empirical: Vec<f64>,
    /// Density of the moment-matched normal `N(mu_z, sigma_z)`.
    pub normal_pdf: Vec<f64>,
    pub max_abs_diff: f64,
    pub mean_abs_diff: f64,
    /// Grid points where the forward engine fell back.
    pub degraded_points: usize,
}

/// Grid bounds: `mu_z +/- h`, stretched so that `c +/- h / 2` is always covered.
pub fn curve_range(pair: &DistributionPair, c: f64, range_sigmas: f64) -> (f64, f64) {
    let half = range_sigmas * pair.std_dev();
    let lo = (pair.mean() - half).min(c - 0.5 * half);
    let hi = (pair.mean() + half).max(c + 0.5 * half);
    (lo, hi)
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| if i == n - 1 { hi } else { lo + step * i as f64 }).collect()
        }
    }
}

pub fn sample_curve(
    engine: &ForwardCdfEngine,
    validator: &MonteCarloValidator,
    pair: &DistributionPair,
    c: f64,
    spec: &CurveSpec,
) -> CdfCurve {
    let (lo, hi) = curve_range(pair, c, spec.range_sigmas);
    let z = linspace(lo, hi, spec.n_points);

    let results: Vec<_> = z.par_iter().map(|&zi| engine.evaluate(pair, zi)).collect();
    let degraded_points = results.iter().filter(|r| r.degraded).count();
    let analytic: Vec<f64> = results.into_iter().map(|r| r.probability).collect();

    let empirical = if spec.mc_samples == 0 {
        Vec::new()
    } else {
        let mut draws = validator.sample_products(pair, spec.mc_samples);
        draws.par_sort_unstable_by(f64::total_cmp);
        let n = draws.len() as f64;
        z.iter()
            .map(|&zi| draws.partition_point(|&d| d <= zi) as f64 / n)
            .collect()
    };

    let (mu, sigma) = (pair.mean(), pair.std_dev());
    let normal_pdf = z.iter().map(|&zi| normal_pdf(zi, mu, sigma)).collect();

    let (max_abs_diff, mean_abs_diff) = if empirical.is_empty() {
        (f64::NAN, f64::NAN)
    } else {
        let diffs: Vec<f64> = analytic
            .iter()
            .zip(&empirical)
            .map(|(a, e)| (a - e).abs())
            .collect();
        let max = diffs.iter().copied().fold(0.0, f64::max);
        (max, diffs.iter().sum::<f64>() / diffs.len() as f64)
    };

    CdfCurve {
        z,
        analytic,
        empirical,
        normal_pdf,
        max_abs_diff,
        mean_abs_diff,
        degraded_points,
    }
}
