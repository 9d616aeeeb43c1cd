//! The radicand transform `W = sqrt(s * X * Y)`.
//!
//! `P(W <= k) = P(X * Y <= k^2 / s)` for `k >= 0`, so the forward engine answers it
//! directly. Delta-method moments of `W` treat `Z = X * Y` as `N(mu_z, sigma_z)`:
//!
//! ```text
//! first order:  E[W] = sqrt(s mu_z)                          Var[W] = s sigma_z^2 / (4 mu_z)
//! second order: E[W] = sqrt(s mu_z) (1 - sigma_z^2 / (8 mu_z^2))
//!               Var[W] = s sigma_z^2 / (4 mu_z) (1 - sigma_z^2 / (8 mu_z^2))
//! ```

use crate::core::{DistributionPair, EngineError, IntegrationMethod, IntegrationResult};
use crate::engines::ForwardCdfEngine;
use crate::math::normal_cdf;

pub const DEFAULT_SCALE: f64 = 14.4;

/// Mean and variance of `W` from one delta-method expansion.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DeltaMoments {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
}

impl DeltaMoments {
    /// `P(W <= k)` under `N(mean, std_dev)`; `None` when the variance is not positive.
    pub fn probability(&self, k: f64) -> Option<f64> {
        (self.variance > 0.0 && self.std_dev.is_finite()).then(|| normal_cdf(k, self.mean, self.std_dev))
    }
}

/// Everything the radicand report needs for one threshold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RadicandAnalysis {
    pub scale: f64,
    /// Threshold on the `Z` scale.
    pub c: f64,
    /// `sqrt(c * s)`.
    pub k: f64,
    /// `k^2 / s`; equals `c` up to rounding.
    pub c_target: f64,
    pub probability: IntegrationResult,
    pub first_order: Option<DeltaMoments>,
    pub second_order: Option<DeltaMoments>,
    pub first_order_probability: Option<f64>,
    pub second_order_probability: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadicandTransform {
    scale: f64,
}

impl Default for RadicandTransform {
    fn default() -> Self {
        Self { scale: DEFAULT_SCALE }
    }
}

impl RadicandTransform {
    pub fn new(scale: f64) -> Result<Self, EngineError> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(EngineError::InvalidParameter(format!(
                "radicand scale must be finite and > 0, got {scale}"
            )));
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// `k = sqrt(c * s)`; `NaN` for negative `c`.
    pub fn k_for_threshold(&self, c: f64) -> f64 {
        (c * self.scale).sqrt()
    }

    pub fn threshold_for_k(&self, k: f64) -> f64 {
        k.powi(2) / self.scale
    }

    /// `P(W <= k)` through the forward engine. Zero for negative `k`.
    pub fn probability(&self, engine: &ForwardCdfEngine, pair: &DistributionPair, k: f64) -> IntegrationResult {
        if k < 0.0 {
            return IntegrationResult {
                probability: 0.0,
                degraded: false,
                method: IntegrationMethod::AdaptiveQuadrature,
                abs_error: 0.0,
            };
        }
        engine.evaluate(pair, self.threshold_for_k(k))
    }

    /// First-order delta moments. `None` unless `mu_z > 0`.
    pub fn first_order(&self, pair: &DistributionPair) -> Option<DeltaMoments> {
        let mu_z = pair.mean();
        if !(mu_z > 0.0) {
            return None;
        }
        let variance = self.scale * pair.variance() / (4.0 * mu_z);
        Some(DeltaMoments {
            mean: (self.scale * mu_z).sqrt(),
            variance,
            std_dev: variance.sqrt(),
        })
    }

    /// Second-order delta moments. `None` unless `mu_z > 0`; the variance can turn
    /// negative when `sigma_z` is large relative to `mu_z`.
    pub fn second_order(&self, pair: &DistributionPair) -> Option<DeltaMoments> {
        let first = self.first_order(pair)?;
        let correction = 1.0 - pair.variance() / (8.0 * pair.mean().powi(2));
        let variance = first.variance * correction;
        Some(DeltaMoments {
            mean: first.mean * correction,
            variance,
            std_dev: if variance > 0.0 { variance.sqrt() } else { f64::NAN },
        })
    }

    pub fn analyze(&self, engine: &ForwardCdfEngine, pair: &DistributionPair, c: f64) -> RadicandAnalysis {
        let k = self.k_for_threshold(c);
        let first_order = self.first_order(pair);
        let second_order = self.second_order(pair);
        RadicandAnalysis {
            scale: self.scale,
            c,
            k,
            c_target: self.threshold_for_k(k),
            probability: self.probability(engine, pair, k),
            first_order,
            second_order,
            first_order_probability: first_order.and_then(|m| m.probability(k)),
            second_order_probability: second_order.and_then(|m| m.probability(k)),
        }
    }
}
