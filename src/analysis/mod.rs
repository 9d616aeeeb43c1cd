//! Diagnostics built on the engines: moment checks, the radicand transform, CDF curves
//! and the independent joint-CDF grid.

pub mod curve;
pub mod grid;
pub mod moments;
pub mod radicand;

pub use curve::{CdfCurve, CurveSpec, sample_curve};
pub use grid::{GridPoint, JointCdfGrid};
pub use moments::{MomentComparison, MomentError, compare_moments, percentage_error};
pub use radicand::{DeltaMoments, RadicandAnalysis, RadicandTransform};
