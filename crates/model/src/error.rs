//! Error types for configuration model operations

use thiserror::Error;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Failures building or transforming a configuration
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The setting name is not known
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// The setting exists but the requested operation or value is invalid
    #[error("Invalid setting change: {0}")]
    InvalidSetting(String),

    /// A referenced stripe or node does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The change conflicts with the current topology
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The change needs an activated cluster, or must run before activation
    #[error("Invalid cluster state: {0}")]
    InvalidState(String),

    /// License content could not be parsed
    #[error("Invalid license: {0}")]
    InvalidLicense(String),
}
