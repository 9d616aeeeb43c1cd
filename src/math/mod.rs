//! Numerical kernels: normal distribution helpers, adaptive quadrature, root finders.
//!
//! The normal helpers go through `statrs`' complementary error function so the far
//! tails keep full relative precision, which the product-CDF integrand relies on.

use std::f64::consts::SQRT_2;

use statrs::function::erf::{erfc, erfc_inv};

pub mod quadrature;
pub mod roots;

pub use quadrature::{QuadratureResult, integrate_adaptive};
pub use roots::{brent, secant};

#[derive(Debug, Clone, PartialEq)]
pub enum MathError {
    NonConvergence,
    NoSignChange,
    InvalidInput(&'static str),
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonConvergence => write!(f, "iteration budget exhausted"),
            Self::NoSignChange => write!(f, "endpoints do not bracket a root"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for MathError {}

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Standard normal density.
#[inline]
pub fn std_normal_pdf(z: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * z * z).exp()
}

/// Standard normal CDF, `0.5 * erfc(-z / sqrt(2))`.
#[inline]
pub fn std_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Standard normal quantile. Returns `-inf`/`+inf` at 0/1 and `NaN` outside `[0, 1]`.
#[inline]
pub fn std_normal_inv_cdf(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    -SQRT_2 * erfc_inv(2.0 * p)
}

#[inline]
pub fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    std_normal_pdf((x - mean) / std) / std
}

#[inline]
pub fn normal_cdf(x: f64, mean: f64, std: f64) -> f64 {
    std_normal_cdf((x - mean) / std)
}

#[inline]
pub fn normal_inv_cdf(p: f64, mean: f64, std: f64) -> f64 {
    mean + std * std_normal_inv_cdf(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CDF_REFERENCE: &[(f64, f64)] = &[
        (-8.0, 6.220_960_574_271_78e-16),
        (-3.0, 0.001_349_898_031_630_094_6),
        (-1.0, 0.158_655_253_931_457_02),
        (0.0, 0.5),
        (1.0, 0.841_344_746_068_542_9),
        (2.0, 0.977_249_868_051_820_8),
    ];

    #[test]
    fn cdf_matches_reference_including_far_tail() {
        for &(z, expected) in CDF_REFERENCE {
            assert_relative_eq!(std_normal_cdf(z), expected, max_relative = 1e-10);
        }
    }

    #[test]
    fn inverse_round_trips() {
        for i in 1..200 {
            let p = i as f64 / 200.0;
            assert_relative_eq!(std_normal_cdf(std_normal_inv_cdf(p)), p, epsilon = 1e-13);
        }
        assert_eq!(std_normal_inv_cdf(0.0), f64::NEG_INFINITY);
        assert_eq!(std_normal_inv_cdf(1.0), f64::INFINITY);
        assert!(std_normal_inv_cdf(1.5).is_nan());
    }

    #[test]
    fn located_scaled_helpers() {
        assert_relative_eq!(normal_cdf(3000.0, 3000.0, 50.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(normal_pdf(10.0, 10.0, 2.0), INV_SQRT_2PI / 2.0, epsilon = 1e-15);
        assert_relative_eq!(normal_inv_cdf(0.975, 5.0, 2.0), 5.0 + 2.0 * 1.959_963_984_540_054, epsilon = 1e-9);
    }
}
