//! Forward CDF of the product of two independent normals.
//!
//! Conditioning on `X = x`:
//!
//! ```text
//! P(XY <= c) = int f_X(x) * g(x, c) dx,   g = P(Y <= c/x)      for x > 0
//!                                          g = 1 - P(Y <= c/x)  for x < 0
//! ```
//!
//! The integral runs over `mu_x +/- n * sigma_x`, split at zero with a small gap on each
//! side. Each side is integrated with adaptive Gauss-Kronrod; a failing side is retried
//! once on a narrower range with relaxed tolerances and otherwise contributes zero.
//! When no side succeeds the moment-matched normal `N(mu_z, sigma_z)` is returned and
//! the result is flagged as degraded.

use tracing::{debug, warn};

use crate::core::{DistributionPair, IntegrationConfig, IntegrationMethod, IntegrationResult};
use crate::math::{
    QuadratureResult, integrate_adaptive, normal_cdf, normal_pdf, std_normal_cdf,
};

/// Relative gap tolerated between the analytic and integrated mass of `X` before a
/// widened (degenerate) domain is considered unresolved.
const MASS_CHECK_TOL: f64 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SideOutcome {
    Skipped,
    Converged(QuadratureResult),
    Retried(QuadratureResult),
    Dropped,
}

impl SideOutcome {
    fn contribution(&self) -> Option<(f64, f64)> {
        match self {
            Self::Converged(r) | Self::Retried(r) => Some((r.value, r.abs_error)),
            Self::Skipped | Self::Dropped => None,
        }
    }
}

/// Forward evaluator for `P(X * Y <= c)`.
///
/// Pure and `Sync`; share one instance across threads.
///
/// # Examples
/// ```rust
/// use normprod::core::DistributionPair;
/// use normprod::engines::ForwardCdfEngine;
///
/// let pair = DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).unwrap();
/// let result = ForwardCdfEngine::default().evaluate(&pair, 3633.0);
/// assert!(!result.degraded);
/// assert!(result.probability > 0.6 && result.probability < 0.8);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ForwardCdfEngine {
    config: IntegrationConfig,
}

impl ForwardCdfEngine {
    pub fn new(config: IntegrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Evaluates `P(X * Y <= c)`.
    ///
    /// Never fails: numerical trouble degrades the result (see module docs) and is
    /// reported through [`IntegrationResult::degraded`] and
    /// [`IntegrationResult::method`].
    pub fn evaluate(&self, pair: &DistributionPair, c: f64) -> IntegrationResult {
        if c.is_nan() {
            warn!(?pair, "threshold is NaN; reporting zero probability");
            return IntegrationResult {
                probability: 0.0,
                degraded: true,
                method: IntegrationMethod::GaussianApproximation,
                abs_error: f64::NAN,
            };
        }
        if c.is_infinite() {
            return IntegrationResult {
                probability: if c > 0.0 { 1.0 } else { 0.0 },
                degraded: false,
                method: IntegrationMethod::AdaptiveQuadrature,
                abs_error: 0.0,
            };
        }

        let cfg = &self.config;
        let (mu_x, sigma_x) = (pair.mu_x(), pair.sigma_x());
        let (mu_y, sigma_y) = (pair.mu_y(), pair.sigma_y());

        let mut half_width = cfg.n_sigmas * sigma_x;
        let widened = !(half_width >= cfg.min_half_width);
        if widened {
            half_width = cfg.min_half_width;
        }
        let x_min = mu_x - half_width;
        let x_max = mu_x + half_width;
        let eps = cfg.singularity_epsilon;

        // Retry range keeps the same units as the (possibly widened) domain.
        let retry_half = half_width * cfg.retry_n_sigmas / cfg.n_sigmas;
        let retry_range = (mu_x - retry_half, mu_x + retry_half);

        let y_lo = mu_y - cfg.clip_sigmas * sigma_y;
        let y_hi = mu_y + cfg.clip_sigmas * sigma_y;
        let floor = cfg.density_floor;

        let integrand = |x: f64| -> f64 {
            if x.abs() < eps {
                return 0.0;
            }
            let density = normal_pdf(x, mu_x, sigma_x);
            if density < floor {
                return 0.0;
            }
            let z = ((c / x).clamp(y_lo, y_hi) - mu_y) / sigma_y;
            // Dividing by a negative x flips the inequality; use the complement
            // directly to keep tail precision.
            let g = if x > 0.0 {
                std_normal_cdf(z)
            } else {
                std_normal_cdf(-z)
            };
            g * density
        };

        let negative = (x_min, x_max.min(-eps));
        let positive = (x_min.max(eps), x_max);

        let neg = self.integrate_side(&integrand, negative, retry_range, "negative");
        let pos = self.integrate_side(&integrand, positive, retry_range, "positive");

        let parts = [neg, pos];
        let contributions: Vec<(f64, f64)> =
            parts.iter().filter_map(SideOutcome::contribution).collect();

        let resolved = !widened || self.mass_resolved(pair, &parts, negative, positive, retry_range);

        if contributions.is_empty() || !resolved {
            let probability = gaussian_approximation(pair, c);
            warn!(
                mu_x,
                sigma_x,
                mu_y,
                sigma_y,
                c,
                probability,
                widened,
                "product CDF quadrature failed; using moment-matched normal"
            );
            return IntegrationResult {
                probability,
                degraded: true,
                method: IntegrationMethod::GaussianApproximation,
                abs_error: f64::NAN,
            };
        }

        let value = contributions.iter().map(|(v, _)| v).sum::<f64>();
        let abs_error = contributions.iter().map(|(_, e)| e).sum::<f64>();
        let dropped = parts.iter().any(|p| matches!(p, SideOutcome::Dropped));
        let retried = parts.iter().any(|p| matches!(p, SideOutcome::Retried(_)));

        IntegrationResult {
            probability: value.clamp(0.0, 1.0),
            degraded: dropped,
            method: if retried || dropped {
                IntegrationMethod::RelaxedRetry
            } else {
                IntegrationMethod::AdaptiveQuadrature
            },
            abs_error,
        }
    }

    fn integrate_side<F>(
        &self,
        f: &F,
        (lo, hi): (f64, f64),
        (retry_lo, retry_hi): (f64, f64),
        side: &'static str,
    ) -> SideOutcome
    where
        F: Fn(f64) -> f64,
    {
        if !(lo < hi) {
            return SideOutcome::Skipped;
        }

        let primary = self.config.primary;
        match integrate_adaptive(f, lo, hi, primary.abs_tol, primary.rel_tol, primary.max_subdivisions) {
            Ok(r) if r.converged => return SideOutcome::Converged(r),
            Ok(r) => debug!(side, lo, hi, abs_error = r.abs_error, "quadrature hit subdivision cap; retrying"),
            Err(err) => debug!(side, lo, hi, %err, "quadrature failed; retrying"),
        }

        let (lo, hi) = (lo.max(retry_lo), hi.min(retry_hi));
        if !(lo < hi) {
            // Narrowed range misses this side entirely: its mass is in the far tail.
            return SideOutcome::Retried(QuadratureResult {
                value: 0.0,
                abs_error: 0.0,
                intervals: 0,
                converged: true,
            });
        }

        let relaxed = self.config.relaxed;
        match integrate_adaptive(f, lo, hi, relaxed.abs_tol, relaxed.rel_tol, relaxed.max_subdivisions) {
            Ok(r) if r.converged => SideOutcome::Retried(r),
            other => {
                debug!(side, lo, hi, outcome = ?other, "relaxed retry failed; side contributes 0");
                SideOutcome::Dropped
            }
        }
    }

    /// On a widened domain the density of `X` can be narrower than the quadrature
    /// resolution. Integrate it alone over the same partition and compare with the
    /// closed form.
    fn mass_resolved(
        &self,
        pair: &DistributionPair,
        parts: &[SideOutcome; 2],
        negative: (f64, f64),
        positive: (f64, f64),
        (retry_lo, retry_hi): (f64, f64),
    ) -> bool {
        let (mu_x, sigma_x) = (pair.mu_x(), pair.sigma_x());
        let primary = self.config.primary;

        for (outcome, (lo, hi)) in parts.iter().zip([negative, positive]) {
            let (lo, hi) = match outcome {
                SideOutcome::Converged(_) => (lo, hi),
                SideOutcome::Retried(_) => (lo.max(retry_lo), hi.min(retry_hi)),
                SideOutcome::Skipped | SideOutcome::Dropped => continue,
            };
            if !(lo < hi) {
                continue;
            }
            let analytic = normal_cdf(hi, mu_x, sigma_x) - normal_cdf(lo, mu_x, sigma_x);
            let integrated = integrate_adaptive(
                |x| normal_pdf(x, mu_x, sigma_x),
                lo,
                hi,
                primary.abs_tol,
                primary.rel_tol,
                primary.max_subdivisions,
            );
            match integrated {
                Ok(r) if (r.value - analytic).abs() <= MASS_CHECK_TOL * analytic.max(1.0) => {}
                _ => return false,
            }
        }
        true
    }
}

/// `P(Z <= c)` under the moment-matched normal `N(mu_z, sigma_z)`.
pub fn gaussian_approximation(pair: &DistributionPair, c: f64) -> f64 {
    normal_cdf(c, pair.mean(), pair.std_dev()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(mu_x: f64, sigma_x: f64, mu_y: f64, sigma_y: f64) -> DistributionPair {
        DistributionPair::new(mu_x, sigma_x, mu_y, sigma_y).unwrap()
    }

    #[test]
    fn reduces_to_normal_cdf_when_y_is_nearly_constant() {
        // Y ~ N(1, tiny) makes Z ~ X.
        let p = pair(5.0, 2.0, 1.0, 1e-9);
        let engine = ForwardCdfEngine::default();
        for c in [1.0, 3.0, 5.0, 7.5, 10.0] {
            let r = engine.evaluate(&p, c);
            assert!(!r.degraded, "c={c}: {r:?}");
            assert_relative_eq!(r.probability, normal_cdf(c, 5.0, 2.0), epsilon = 1e-6);
        }
    }

    #[test]
    fn symmetric_x_gives_half_below_zero() {
        let engine = ForwardCdfEngine::default();
        for p in [pair(0.0, 1.0, 3.0, 0.5), pair(0.0, 4.0, -2.0, 7.0), pair(0.0, 0.1, 0.0, 1.0)] {
            let r = engine.evaluate(&p, 0.0);
            assert_relative_eq!(r.probability, 0.5, epsilon = 1e-7);
        }
    }

    #[test]
    fn domain_on_one_side_of_zero_skips_the_other() {
        let p = pair(100.0, 1.0, 30.0, 1.0);
        let r = ForwardCdfEngine::default().evaluate(&p, 3000.0);
        assert_eq!(r.method, IntegrationMethod::AdaptiveQuadrature);
        assert!((r.probability - 0.5).abs() < 0.01);
    }

    #[test]
    fn infinite_thresholds_short_circuit() {
        let p = pair(1.0, 1.0, 1.0, 1.0);
        let engine = ForwardCdfEngine::default();
        assert_eq!(engine.evaluate(&p, f64::INFINITY).probability, 1.0);
        assert_eq!(engine.evaluate(&p, f64::NEG_INFINITY).probability, 0.0);
        let nan = engine.evaluate(&p, f64::NAN);
        assert!(nan.degraded);
        assert_eq!(nan.probability, 0.0);
    }

    #[test]
    fn degenerate_sigma_x_stays_finite_and_near_limit() {
        // sigma_x so small that n * sigma_x collapses below the minimum half-width.
        let p = pair(100.0, 1e-12, 30.0, 1.5);
        let r = ForwardCdfEngine::default().evaluate(&p, 3000.0);
        assert!(r.probability.is_finite());
        assert!((0.0..=1.0).contains(&r.probability));
        // Z is essentially 100 * Y, so P(Z <= 3000) = P(Y <= 30) = 0.5.
        assert!((r.probability - 0.5).abs() < 1e-3, "{r:?}");
    }

    #[test]
    fn gaussian_fallback_when_domain_vanishes_into_the_gap() {
        let cfg = IntegrationConfig {
            min_half_width: 1e-13,
            ..IntegrationConfig::default()
        };
        let p = pair(0.0, 1e-15, 2.0, 1.0);
        let r = ForwardCdfEngine::new(cfg).evaluate(&p, 1.0);
        assert_eq!(r.method, IntegrationMethod::GaussianApproximation);
        assert!(r.degraded);
        assert_relative_eq!(r.probability, gaussian_approximation(&p, 1.0), epsilon = 1e-15);
    }

    #[test]
    fn relaxed_retry_is_reported() {
        // Impossible primary tolerance forces the narrowed retry.
        let mut cfg = IntegrationConfig::default();
        cfg.primary.max_subdivisions = 1;
        cfg.primary.abs_tol = 1e-300;
        cfg.primary.rel_tol = 1e-300;
        let p = pair(2.0, 1.0, 3.0, 1.0);
        let r = ForwardCdfEngine::new(cfg).evaluate(&p, 5.0);
        assert_eq!(r.method, IntegrationMethod::RelaxedRetry);
        let reference = ForwardCdfEngine::default().evaluate(&p, 5.0);
        assert_relative_eq!(r.probability, reference.probability, epsilon = 1e-4);
    }
}
