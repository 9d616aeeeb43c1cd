//! Tunable constants for every engine, serializable as JSON.
//!
//! All sections carry `#[serde(default)]`, so a config file only needs the fields it
//! overrides.
//!
//! # Examples
//! ```rust
//! use normprod::core::EngineConfig;
//!
//! let cfg = EngineConfig::from_json(r#"{ "batch": { "max_concurrency": 8 } }"#).unwrap();
//! assert_eq!(cfg.batch.max_concurrency, 8);
//! assert_eq!(cfg.integration.n_sigmas, 10.0);
//!
//! let json = cfg.to_json_pretty().unwrap();
//! assert_eq!(EngineConfig::from_json(&json).unwrap(), cfg);
//! ```

use std::path::Path;

use super::EngineError;

/// Adaptive-quadrature tolerances for one integration attempt.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuadratureTolerance {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_subdivisions: usize,
}

impl QuadratureTolerance {
    fn validate(&self, name: &str) -> Result<(), EngineError> {
        if !(self.abs_tol > 0.0) || !(self.rel_tol > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "{name}: tolerances must be > 0"
            )));
        }
        if self.max_subdivisions == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "{name}: max_subdivisions must be > 0"
            )));
        }
        Ok(())
    }
}

/// Forward-CDF integration settings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Half-width of the integration domain in multiples of `sigma_x`.
    pub n_sigmas: f64,
    /// Half-width of the narrowed range used by the retry.
    pub retry_n_sigmas: f64,
    /// Half-width used when `n_sigmas * sigma_x` collapses below it.
    pub min_half_width: f64,
    /// Gap excluded on each side of `x = 0`.
    pub singularity_epsilon: f64,
    /// `c / x` is clipped to `mu_y +/- clip_sigmas * sigma_y`.
    pub clip_sigmas: f64,
    /// Below this density of `X` the integrand is exactly zero.
    pub density_floor: f64,
    pub primary: QuadratureTolerance,
    pub relaxed: QuadratureTolerance,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            n_sigmas: 10.0,
            retry_n_sigmas: 5.0,
            min_half_width: 1.0e-6,
            singularity_epsilon: 1.0e-12,
            clip_sigmas: 20.0,
            density_floor: 1.0e-300,
            primary: QuadratureTolerance {
                abs_tol: 1.0e-10,
                rel_tol: 1.0e-8,
                max_subdivisions: 200,
            },
            relaxed: QuadratureTolerance {
                abs_tol: 1.0e-6,
                rel_tol: 1.0e-4,
                max_subdivisions: 100,
            },
        }
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.n_sigmas > 0.0) || !(self.retry_n_sigmas > 0.0) {
            return Err(EngineError::InvalidConfig(
                "n_sigmas and retry_n_sigmas must be > 0".to_string(),
            ));
        }
        if !(self.min_half_width > 0.0) {
            return Err(EngineError::InvalidConfig(
                "min_half_width must be > 0".to_string(),
            ));
        }
        if !(self.singularity_epsilon > 0.0) || !(self.clip_sigmas > 0.0) {
            return Err(EngineError::InvalidConfig(
                "singularity_epsilon and clip_sigmas must be > 0".to_string(),
            ));
        }
        if !(self.density_floor >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "density_floor must be >= 0".to_string(),
            ));
        }
        self.primary.validate("primary")?;
        self.relaxed.validate("relaxed")
    }
}

/// Inverse-CDF solver settings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Initial bracket half-width in multiples of the product std.
    pub initial_bracket_sigmas: f64,
    pub max_bracket_attempts: usize,
    /// Attempts that double the bracket symmetrically before one-sided growth.
    pub symmetric_attempts: usize,
    /// One-sided growth step in multiples of the product std.
    pub asymmetric_step_sigmas: f64,
    pub x_tol: f64,
    pub r_tol: f64,
    pub max_iterations: usize,
    /// Absolute `|target - mc|` above which a warning is logged.
    pub disagreement_tolerance: f64,
    /// Monte Carlo draws for verification; 0 disables it.
    pub verification_samples: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_bracket_sigmas: 3.0,
            max_bracket_attempts: 15,
            symmetric_attempts: 5,
            asymmetric_step_sigmas: 3.0,
            x_tol: 1.0e-8,
            r_tol: 1.0e-10,
            max_iterations: 100,
            disagreement_tolerance: 1.0e-4,
            verification_samples: 1_000_000,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.initial_bracket_sigmas > 0.0) || !(self.asymmetric_step_sigmas > 0.0) {
            return Err(EngineError::InvalidConfig(
                "bracket widths must be > 0".to_string(),
            ));
        }
        if self.max_bracket_attempts == 0 || self.max_iterations == 0 {
            return Err(EngineError::InvalidConfig(
                "max_bracket_attempts and max_iterations must be > 0".to_string(),
            ));
        }
        if !(self.x_tol > 0.0) || !(self.r_tol >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "x_tol must be > 0 and r_tol >= 0".to_string(),
            ));
        }
        if !(self.disagreement_tolerance >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "disagreement_tolerance must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Monte Carlo sampling settings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub n_samples: usize,
    pub seed: u64,
    /// Draws per parallel chunk; the chunk layout depends only on this, never on
    /// the number of threads.
    pub chunk_size: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_samples: 1_000_000,
            seed: 42,
            chunk_size: 65_536,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Batch harness settings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Admission-gate size: tasks in flight at once.
    pub max_concurrency: usize,
    /// Worker threads; 0 means one per admission slot, capped at available cores.
    pub worker_threads: usize,
    /// Target probability for the inverse threshold of each cell.
    pub target_probability: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            worker_threads: 0,
            target_probability: 0.98,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        if !(self.target_probability > 0.0 && self.target_probability < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "target_probability must lie in (0, 1), got {}",
                self.target_probability
            )));
        }
        Ok(())
    }
}

/// Top-level configuration bundle.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub integration: IntegrationConfig,
    pub solver: SolverConfig,
    pub monte_carlo: MonteCarloConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.integration.validate()?;
        self.solver.validate()?;
        self.monte_carlo.validate()?;
        self.batch.validate()
    }

    /// Parses and validates a JSON payload.
    pub fn from_json(payload: &str) -> Result<Self, EngineError> {
        let cfg: Self = serde_json::from_str(payload)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and validates a JSON config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let payload = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Io(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_json(&payload)
    }

    pub fn to_json_pretty(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
