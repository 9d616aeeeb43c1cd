//! Inverse CDF of the product of two independent normals.
//!
//! Finds `c` with `P(X * Y <= c) = p` by root-finding on the forward engine:
//!
//! 1. Initial guess from the moment-matched normal `N(mu_z, sigma_z)`.
//! 2. Bracket search around the guess, symmetric doubling first, then one-sided steps
//!    toward the end whose objective is closer to zero.
//! 3. Brent on the bracket; secant from the guess when no bracket is found; the guess
//!    itself when both fail.
//! 4. Optional Monte Carlo verification of the solved threshold.

use tracing::{debug, warn};

use super::forward::ForwardCdfEngine;
use crate::core::{
    DistributionPair, EngineConfig, EngineError, InverseSolution, SolveMethod, SolverConfig,
    Verification,
};
use crate::math::{brent, normal_inv_cdf, secant};
use crate::mc::MonteCarloValidator;

const SECANT_F_TOL: f64 = 1.0e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bracket {
    lo: f64,
    hi: f64,
}

/// Grows a sign-change bracket around `guess`. `scale` is the product std.
///
/// Only the endpoint that moved is re-evaluated.
fn expand_bracket<F>(f: &F, guess: f64, scale: f64, cfg: &SolverConfig) -> Option<Bracket>
where
    F: Fn(f64) -> f64,
{
    let mut half = cfg.initial_bracket_sigmas * scale;
    if 2.0 * half < 0.1 * guess.abs() {
        half = (0.5 * guess.abs()).max(2.0 * scale);
    }
    let mut lo = guess - half;
    let mut hi = guess + half;
    let mut f_lo = f(lo);
    let mut f_hi = f(hi);
    let step = cfg.asymmetric_step_sigmas * scale;

    for attempt in 0..cfg.max_bracket_attempts {
        if f_lo == 0.0 || f_hi == 0.0 || f_lo.signum() != f_hi.signum() {
            return Some(Bracket { lo, hi });
        }
        if attempt < cfg.symmetric_attempts {
            half *= 2.0;
            lo = guess - half;
            hi = guess + half;
            f_lo = f(lo);
            f_hi = f(hi);
        } else if f_lo.abs() < f_hi.abs() {
            lo -= step;
            f_lo = f(lo);
        } else {
            hi += step;
            f_hi = f(hi);
        }
        debug!(attempt, lo, hi, f_lo, f_hi, "expanding bracket");
    }

    if f_lo.signum() != f_hi.signum() {
        Some(Bracket { lo, hi })
    } else {
        None
    }
}

/// Absolute root tolerance: the configured `x_tol + r_tol * |guess|`, capped at a
/// millionth of the product std and floored at a few ulps of `guess`.
fn root_tolerance(guess: f64, scale: f64, cfg: &SolverConfig) -> f64 {
    (cfg.x_tol + cfg.r_tol * guess.abs())
        .min(1.0e-6 * scale)
        .max(4.0 * f64::EPSILON * guess.abs())
        .max(f64::MIN_POSITIVE)
}

/// Root of `f` near `guess` with the fallback chain Brent, secant, guess.
fn locate_root<F>(f: &F, guess: f64, scale: f64, cfg: &SolverConfig) -> (f64, SolveMethod)
where
    F: Fn(f64) -> f64,
{
    let x_tol = root_tolerance(guess, scale, cfg);
    if let Some(Bracket { lo, hi }) = expand_bracket(f, guess, scale, cfg) {
        match brent(f, lo, hi, x_tol, 0.0, cfg.max_iterations) {
            Ok(root) => return (root, SolveMethod::Bracketed),
            Err(err) => debug!(lo, hi, %err, "brent failed inside bracket"),
        }
    } else {
        debug!(guess, scale, "no sign change found; trying secant");
    }

    match secant(f, guess, guess + 0.1 * scale, x_tol, SECANT_F_TOL, cfg.max_iterations) {
        Ok(root) if root.is_finite() => (root, SolveMethod::Secant),
        other => {
            debug!(guess, outcome = ?other, "secant failed; returning initial guess");
            (guess, SolveMethod::InitialGuess)
        }
    }
}

/// Solver for `c` in `P(X * Y <= c) = p`.
///
/// # Examples
/// ```rust
/// use normprod::core::{DistributionPair, EngineConfig};
/// use normprod::engines::InverseCdfSolver;
///
/// let mut cfg = EngineConfig::default();
/// cfg.solver.verification_samples = 0;
/// let solver = InverseCdfSolver::from_config(&cfg);
///
/// let pair = DistributionPair::new(20.0, 30.0, 300.0, 150.0).unwrap();
/// let sol = solver.solve(&pair, 0.95).unwrap();
/// assert!((sol.achieved_probability - 0.95).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InverseCdfSolver {
    forward: ForwardCdfEngine,
    validator: MonteCarloValidator,
    config: SolverConfig,
}

impl InverseCdfSolver {
    pub fn new(forward: ForwardCdfEngine, validator: MonteCarloValidator, config: SolverConfig) -> Self {
        Self {
            forward,
            validator,
            config,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            ForwardCdfEngine::new(config.integration),
            MonteCarloValidator::new(config.monte_carlo),
            config.solver,
        )
    }

    pub fn forward(&self) -> &ForwardCdfEngine {
        &self.forward
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves for the threshold at `target_probability`.
    ///
    /// Numerical difficulty never produces an error; it shows up as
    /// [`SolveMethod::Secant`] or [`SolveMethod::InitialGuess`].
    ///
    /// # Errors
    /// [`EngineError::InvalidParameter`] when `target_probability` is not in `(0, 1)`.
    pub fn solve(&self, pair: &DistributionPair, target_probability: f64) -> Result<InverseSolution, EngineError> {
        if !(target_probability > 0.0 && target_probability < 1.0) {
            return Err(EngineError::InvalidParameter(format!(
                "target probability must lie in (0, 1), got {target_probability}"
            )));
        }

        let sigma_z = pair.std_dev();
        let initial_guess = normal_inv_cdf(target_probability, pair.mean(), sigma_z);
        // sigma_z underflows to zero only for pathological scales.
        let scale = if sigma_z > 0.0 && sigma_z.is_finite() {
            sigma_z
        } else {
            initial_guess.abs().max(1.0) * 1.0e-6
        };

        let objective = |c: f64| self.forward.evaluate(pair, c).probability - target_probability;
        let (threshold, method) = locate_root(&objective, initial_guess, scale, &self.config);
        let achieved_probability = self.forward.evaluate(pair, threshold).probability;

        if method != SolveMethod::Bracketed {
            debug!(?pair, target_probability, threshold, ?method, "inverse solve fell back");
        }

        let verification = self.verify(pair, threshold, target_probability);

        Ok(InverseSolution {
            target_probability,
            threshold,
            initial_guess,
            method,
            achieved_probability,
            verification,
        })
    }

    fn verify(&self, pair: &DistributionPair, threshold: f64, target: f64) -> Option<Verification> {
        let n = self.config.verification_samples;
        if n == 0 {
            return None;
        }
        let mc = self.validator.estimate_with_error(pair, threshold, n);
        let abs_error = (target - mc.probability).abs();
        let exceeds_tolerance = abs_error > self.config.disagreement_tolerance;
        if exceeds_tolerance {
            warn!(
                mu_x = pair.mu_x(),
                sigma_x = pair.sigma_x(),
                mu_y = pair.mu_y(),
                sigma_y = pair.sigma_y(),
                threshold,
                target,
                mc_probability = mc.probability,
                mc_stderr = mc.stderr,
                "monte carlo disagrees with solved threshold"
            );
        }
        Some(Verification {
            mc_probability: mc.probability,
            mc_stderr: mc.stderr,
            n_samples: n,
            abs_error,
            rel_error: abs_error / target,
            exceeds_tolerance,
        })
    }
}
