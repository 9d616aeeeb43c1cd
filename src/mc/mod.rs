//! Monte Carlo sampling of `Z = X * Y` for cross-checking the analytic engines.
//!
//! Draws are split into fixed-size chunks, each with its own `StdRng` seeded from the
//! base seed and the chunk index. The chunk layout depends only on the sample count
//! and `chunk_size`, so estimates are reproducible regardless of how many rayon
//! threads run them or what else is running on the pool.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::core::{DistributionPair, MonteCarloConfig};

/// Empirical probability with its binomial standard error.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct McEstimate {
    pub probability: f64,
    /// `sqrt(p * (1 - p) / n)`.
    pub stderr: f64,
    pub n_samples: usize,
}

/// Sample mean and unbiased variance of `Z`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct EmpiricalMoments {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub n_samples: usize,
}

/// Analytic vs empirical probability at one threshold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Agreement {
    pub analytic: f64,
    pub empirical: f64,
    pub abs_diff: f64,
    /// See [`relative_difference_pct`].
    pub rel_diff_pct: f64,
    pub stderr: f64,
    /// `(empirical - analytic) / stderr`.
    pub z_score: f64,
    pub n_samples: usize,
}

/// `|empirical - analytic| / |analytic| * 100`; 0 when both are zero, 100 when only
/// the analytic value is zero.
pub fn relative_difference_pct(analytic: f64, empirical: f64) -> f64 {
    if analytic == 0.0 {
        if empirical == 0.0 { 0.0 } else { 100.0 }
    } else {
        (empirical - analytic).abs() / analytic.abs() * 100.0
    }
}

#[inline]
fn chunk_seed(seed: u64, chunk: usize) -> u64 {
    seed.wrapping_add(chunk as u64 * 7_919)
}

#[inline]
fn draw_product<R: rand::Rng + ?Sized>(rng: &mut R, pair: &DistributionPair) -> f64 {
    let zx: f64 = StandardNormal.sample(rng);
    let zy: f64 = StandardNormal.sample(rng);
    (pair.mu_x() + pair.sigma_x() * zx) * (pair.mu_y() + pair.sigma_y() * zy)
}

/// Running `(count, mean, m2)` for one chunk; merged with Chan's update.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    n: usize,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, v: f64) {
        self.n += 1;
        let delta = v - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (v - self.mean);
    }

    fn merge(self, other: Self) -> Self {
        if self.n == 0 {
            return other;
        }
        if other.n == 0 {
            return self;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.n as f64 / n as f64;
        let m2 = self.m2 + other.m2 + delta * delta * (self.n as f64 * other.n as f64) / n as f64;
        Self { n, mean, m2 }
    }
}

/// Seeded, chunk-parallel sampler of `X * Y`.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloValidator {
    config: MonteCarloConfig,
}

impl MonteCarloValidator {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    fn chunks(&self, n_samples: usize) -> impl IndexedParallelIterator<Item = (usize, usize)> + '_ {
        let size = self.config.chunk_size.max(1);
        let count = n_samples.div_ceil(size);
        (0..count)
            .into_par_iter()
            .map(move |i| (i, size.min(n_samples - i * size)))
    }

    fn chunk_rng(&self, chunk: usize) -> StdRng {
        StdRng::seed_from_u64(chunk_seed(self.config.seed, chunk))
    }

    /// Fraction of `n_samples` draws with `X * Y <= c`. `NaN` when `n_samples == 0`.
    pub fn estimate(&self, pair: &DistributionPair, c: f64, n_samples: usize) -> f64 {
        if n_samples == 0 {
            return f64::NAN;
        }
        let hits: usize = self
            .chunks(n_samples)
            .map(|(i, len)| {
                let mut rng = self.chunk_rng(i);
                (0..len).filter(|_| draw_product(&mut rng, pair) <= c).count()
            })
            .sum();
        hits as f64 / n_samples as f64
    }

    /// [`estimate`](Self::estimate) with the binomial standard error.
    pub fn estimate_with_error(&self, pair: &DistributionPair, c: f64, n_samples: usize) -> McEstimate {
        let probability = self.estimate(pair, c, n_samples);
        let stderr = if n_samples == 0 {
            f64::NAN
        } else {
            (probability * (1.0 - probability) / n_samples as f64).sqrt()
        };
        McEstimate {
            probability,
            stderr,
            n_samples,
        }
    }

    /// Raw draws of `X * Y`, in chunk order.
    pub fn sample_products(&self, pair: &DistributionPair, n_samples: usize) -> Vec<f64> {
        self.chunks(n_samples)
            .map(|(i, len)| {
                let mut rng = self.chunk_rng(i);
                (0..len).map(|_| draw_product(&mut rng, pair)).collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .concat()
    }

    /// Mean and variance of `n_samples` draws of `X * Y`.
    pub fn sample_moments(&self, pair: &DistributionPair, n_samples: usize) -> EmpiricalMoments {
        let parts: Vec<Welford> = self
            .chunks(n_samples)
            .map(|(i, len)| {
                let mut rng = self.chunk_rng(i);
                let mut acc = Welford::default();
                for _ in 0..len {
                    acc.push(draw_product(&mut rng, pair));
                }
                acc
            })
            .collect();
        // Sequential merge keeps the result independent of the reduction tree.
        let total = parts.into_iter().fold(Welford::default(), Welford::merge);

        let variance = if total.n > 1 {
            total.m2 / (total.n - 1) as f64
        } else {
            0.0
        };
        EmpiricalMoments {
            mean: if total.n == 0 { f64::NAN } else { total.mean },
            variance,
            std_dev: variance.sqrt(),
            n_samples: total.n,
        }
    }

    /// Samples `P(X * Y <= c)` and compares it with an analytic value.
    pub fn compare(&self, pair: &DistributionPair, c: f64, analytic: f64, n_samples: usize) -> Agreement {
        let mc = self.estimate_with_error(pair, c, n_samples);
        let diff = mc.probability - analytic;
        let z_score = if mc.stderr > 0.0 {
            diff / mc.stderr
        } else if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(diff)
        };
        Agreement {
            analytic,
            empirical: mc.probability,
            abs_diff: diff.abs(),
            rel_diff_pct: relative_difference_pct(analytic, mc.probability),
            stderr: mc.stderr,
            z_score,
            n_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::normal_cdf;
    use approx::assert_relative_eq;

    fn validator(seed: u64) -> MonteCarloValidator {
        MonteCarloValidator::new(MonteCarloConfig {
            n_samples: 200_000,
            seed,
            chunk_size: 4_096,
        })
    }

    #[test]
    fn same_seed_same_estimate() {
        let pair = DistributionPair::new(10.0, 3.0, 5.0, 1.0).unwrap();
        let a = validator(7).estimate(&pair, 50.0, 100_000);
        let b = validator(7).estimate(&pair, 50.0, 100_000);
        assert_eq!(a, b);
        let c = validator(8).estimate(&pair, 50.0, 100_000);
        assert_ne!(a, c);
    }

    #[test]
    fn estimate_is_independent_of_thread_count() {
        let pair = DistributionPair::new(10.0, 3.0, 5.0, 1.0).unwrap();
        let v = validator(11);
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| v.estimate(&pair, 48.0, 50_000));
        let many = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| v.estimate(&pair, 48.0, 50_000));
        assert_eq!(single, many);
    }

    #[test]
    fn nearly_constant_y_matches_normal_cdf() {
        let pair = DistributionPair::new(4.0, 2.0, 1.0, 1e-9).unwrap();
        let est = validator(3).estimate_with_error(&pair, 5.0, 200_000);
        let exact = normal_cdf(5.0, 4.0, 2.0);
        assert!((est.probability - exact).abs() < 4.0 * est.stderr);
        assert_relative_eq!(
            est.stderr,
            (est.probability * (1.0 - est.probability) / 200_000.0).sqrt()
        );
    }

    #[test]
    fn sample_moments_track_closed_form() {
        let pair = DistributionPair::new(20.0, 3.0, 30.0, 2.0).unwrap();
        let m = validator(5).sample_moments(&pair, 200_000);
        assert_eq!(m.n_samples, 200_000);
        assert_relative_eq!(m.mean, pair.mean(), max_relative = 5e-3);
        assert_relative_eq!(m.variance, pair.variance(), max_relative = 2e-2);
    }

    #[test]
    fn products_follow_chunk_layout() {
        let pair = DistributionPair::new(1.0, 1.0, 1.0, 1.0).unwrap();
        let v = validator(9);
        let draws = v.sample_products(&pair, 10_000);
        assert_eq!(draws.len(), 10_000);
        let counted = draws.iter().filter(|&&z| z <= 0.5).count() as f64 / 10_000.0;
        assert_eq!(counted, v.estimate(&pair, 0.5, 10_000));
    }

    #[test]
    fn empty_sample_yields_nan() {
        let pair = DistributionPair::new(1.0, 1.0, 1.0, 1.0).unwrap();
        assert!(validator(1).estimate(&pair, 1.0, 0).is_nan());
        assert_eq!(validator(1).sample_moments(&pair, 0).n_samples, 0);
    }

    #[test]
    fn relative_difference_edge_cases() {
        assert_eq!(relative_difference_pct(0.0, 0.0), 0.0);
        assert_eq!(relative_difference_pct(0.0, 0.01), 100.0);
        assert_relative_eq!(relative_difference_pct(0.5, 0.51), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn compare_reports_z_score() {
        let pair = DistributionPair::new(0.0, 1.0, 2.0, 0.5).unwrap();
        let agreement = validator(2).compare(&pair, 0.0, 0.5, 100_000);
        assert!(agreement.z_score.abs() < 4.0);
        assert_relative_eq!(agreement.abs_diff, (agreement.empirical - 0.5).abs());
    }
}
