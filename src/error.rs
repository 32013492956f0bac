//! Error types for the forecast engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur when building or running a forecast.
///
/// Only [`EngineError::Config`] is fatal; every other failure mode is
/// recovered locally (retry, skip, coarsen, keep-coarse) and surfaced
/// through the run's `warnings` metadata instead of aborting.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration (bad orb table, unknown aspect, contradictory
    /// options). Raised at construction time, never per-lookup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Position or house provider failure after retries.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// JSON serialization of a payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reference chart could not be resolved (no natal positions).
    #[error("Invalid chart: {0}")]
    InvalidChart(String),
}

/// Configuration validation errors. Fatal at construction time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown aspect name: {0}")]
    UnknownAspect(String),

    #[error("Unknown body name: {0}")]
    UnknownBody(String),

    #[error("Invalid orb value for {key}: {value}")]
    InvalidOrb { key: String, value: f64 },

    #[error("Invalid option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Position/house provider failures for a single lookup.
///
/// Provider errors are retried with bounded backoff; if retries are
/// exhausted the affected grid point is skipped and a warning recorded.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Body not supported by provider: {0}")]
    UnsupportedBody(String),

    #[error("Provider lookup failed: {0}")]
    Lookup(String),

    #[error("Provider timed out")]
    Timeout,
}
