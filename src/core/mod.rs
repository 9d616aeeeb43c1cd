//! Core value types, engine configuration, and library-wide error structures.

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;

/// Errors surfaced at the public boundary of the crate.
///
/// Numerical trouble inside the engines never shows up here; it is absorbed by the
/// fallback chains and reported through `degraded` flags instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A distribution parameter violates its contract (non-finite, non-positive scale).
    InvalidParameter(String),
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// Reading or writing an external store failed.
    Io(String),
    /// A payload could not be encoded or decoded.
    Serialization(String),
    /// A batch task failed and was isolated at its boundary.
    TaskFailed(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::TaskFailed(msg) => write!(f, "task failed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
