//! Theoretical vs empirical moments of `Z = X * Y`.

use crate::core::DistributionPair;
use crate::mc::EmpiricalMoments;

/// Denominator used instead of an exactly-zero theoretical value.
const ZERO_GUARD: f64 = 1.0e-9;

/// `|empirical - theoretical| / |theoretical| * 100`, with `theoretical == 0`
/// replaced by `1e-9`.
pub fn percentage_error(theoretical: f64, empirical: f64) -> f64 {
    let denom = if theoretical == 0.0 { ZERO_GUARD } else { theoretical };
    (empirical - theoretical).abs() / denom.abs() * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MomentError {
    pub theoretical: f64,
    pub empirical: f64,
    /// Signed `empirical - theoretical`.
    pub error: f64,
    pub error_pct: f64,
}

impl MomentError {
    pub fn new(theoretical: f64, empirical: f64) -> Self {
        Self {
            theoretical,
            empirical,
            error: empirical - theoretical,
            error_pct: percentage_error(theoretical, empirical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MomentComparison {
    pub mean: MomentError,
    pub variance: MomentError,
    pub std_dev: MomentError,
    pub n_samples: usize,
}

pub fn compare_moments(pair: &DistributionPair, empirical: &EmpiricalMoments) -> MomentComparison {
    MomentComparison {
        mean: MomentError::new(pair.mean(), empirical.mean),
        variance: MomentError::new(pair.variance(), empirical.variance),
        std_dev: MomentError::new(pair.std_dev(), empirical.std_dev),
        n_samples: empirical.n_samples,
    }
}
