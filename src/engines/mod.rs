//! Analytic engines for the product of two independent normals.

pub mod forward;
pub mod inverse;

pub use forward::{ForwardCdfEngine, gaussian_approximation};
pub use inverse::InverseCdfSolver;
