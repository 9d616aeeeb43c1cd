use super::EngineError;

/// Parameters of two independent normal variables `X ~ N(mu_x, sigma_x)` and
/// `Y ~ N(mu_y, sigma_y)` whose product `Z = X * Y` is being studied.
///
/// Construction validates the scale parameters; a pair that exists is always usable
/// by the engines.
///
/// # Examples
/// ```rust
/// use normprod::core::DistributionPair;
///
/// let pair = DistributionPair::new(100.0, 35.8305, 30.0, 1.6433).unwrap();
/// assert_eq!(pair.mean(), 3000.0);
/// assert!(pair.std_dev() > 1000.0);
///
/// assert!(DistributionPair::new(1.0, 0.0, 1.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DistributionPair {
    mu_x: f64,
    sigma_x: f64,
    mu_y: f64,
    sigma_y: f64,
}

impl DistributionPair {
    pub fn new(mu_x: f64, sigma_x: f64, mu_y: f64, sigma_y: f64) -> Result<Self, EngineError> {
        if !mu_x.is_finite() || !mu_y.is_finite() {
            return Err(EngineError::InvalidParameter(format!(
                "means must be finite: mu_x={mu_x}, mu_y={mu_y}"
            )));
        }
        if !sigma_x.is_finite() || sigma_x <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "sigma_x must be finite and > 0, got {sigma_x}"
            )));
        }
        if !sigma_y.is_finite() || sigma_y <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "sigma_y must be finite and > 0, got {sigma_y}"
            )));
        }
        Ok(Self {
            mu_x,
            sigma_x,
            mu_y,
            sigma_y,
        })
    }

    #[inline]
    pub fn mu_x(&self) -> f64 {
        self.mu_x
    }

    #[inline]
    pub fn sigma_x(&self) -> f64 {
        self.sigma_x
    }

    #[inline]
    pub fn mu_y(&self) -> f64 {
        self.mu_y
    }

    #[inline]
    pub fn sigma_y(&self) -> f64 {
        self.sigma_y
    }

    /// Exact mean of the product, `mu_x * mu_y`.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mu_x * self.mu_y
    }

    /// Exact variance of the product of independent normals.
    #[inline]
    pub fn variance(&self) -> f64 {
        let (mx2, my2) = (self.mu_x * self.mu_x, self.mu_y * self.mu_y);
        let (sx2, sy2) = (self.sigma_x * self.sigma_x, self.sigma_y * self.sigma_y);
        mx2 * sy2 + my2 * sx2 + sx2 * sy2
    }

    #[inline]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Integration path that produced a forward probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Every attempted sub-interval converged at the primary tolerances.
    AdaptiveQuadrature,
    /// At least one sub-interval needed the relaxed, narrowed retry.
    RelaxedRetry,
    /// Quadrature failed everywhere; moment-matched normal used instead.
    GaussianApproximation,
}

/// Outcome of one forward CDF evaluation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct IntegrationResult {
    /// `P(X * Y <= c)`, clamped to `[0, 1]`.
    pub probability: f64,
    /// True when any fallback lowered the precision guarantee.
    pub degraded: bool,
    pub method: IntegrationMethod,
    /// Summed quadrature error estimate (`NaN` for the Gaussian fallback).
    pub abs_error: f64,
}

/// Root-finding path that produced an inverse threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMethod {
    /// Brent's method on a verified sign-change bracket.
    Bracketed,
    /// Secant iteration from the Gaussian guess (no bracket found).
    Secant,
    /// Every solver failed; the moment-matched normal quantile is returned.
    InitialGuess,
}

/// Monte Carlo cross-check attached to an inverse solution.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Verification {
    pub mc_probability: f64,
    pub mc_stderr: f64,
    pub n_samples: usize,
    /// `|target - mc_probability|`.
    pub abs_error: f64,
    /// `abs_error / target`.
    pub rel_error: f64,
    pub exceeds_tolerance: bool,
}

/// Threshold `c` with `P(X * Y <= c) ~= target_probability`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct InverseSolution {
    pub target_probability: f64,
    pub threshold: f64,
    pub initial_guess: f64,
    pub method: SolveMethod,
    /// Forward probability re-evaluated at `threshold`.
    pub achieved_probability: f64,
    pub verification: Option<Verification>,
}

/// Largest `|achieved - target|` an inverse solution may show and still count as clean.
pub const ROUND_TRIP_TOLERANCE: f64 = 1.0e-3;

impl InverseSolution {
    /// True when the threshold came from a fallback rather than a bracketed root, or
    /// when the forward probability at the threshold misses the target by more than
    /// [`ROUND_TRIP_TOLERANCE`].
    pub fn degraded(&self) -> bool {
        let missed = !((self.achieved_probability - self.target_probability).abs() <= ROUND_TRIP_TOLERANCE);
        missed || !matches!(self.method, SolveMethod::Bracketed)
    }
}
