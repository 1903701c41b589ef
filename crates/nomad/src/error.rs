//! Error types for the Nomad protocol
//!
//! Protocol-level refusals are not errors: a server that declines a message
//! answers with [`crate::AcceptRejectResponse::Reject`]. The types here cover
//! failures that prevent an answer altogether.

use thiserror::Error;

/// Result type for Nomad server operations
pub type NomadResult<T> = Result<T, NomadError>;

/// Failures of a Nomad server or client call
#[derive(Error, Debug)]
pub enum NomadError {
    /// Persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] dynconf_storage::StorageError),

    /// A persisted record could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// The persisted change log contradicts the server state
    #[error("Corrupted change log: {0}")]
    Corrupted(String),

    /// Applying a committed change to the running system failed
    #[error("Change application failed: {0}")]
    Application(String),

    /// Invalid client or server configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failures reaching a remote Nomad endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The call did not complete in time
    #[error("Timeout after {millis}ms during {operation}")]
    Timeout {
        /// What was being attempted
        operation: String,
        /// The timeout that elapsed
        millis: u128,
    },

    /// The endpoint answered with an error instead of a response
    #[error("Remote error: {0}")]
    Remote(String),
}

impl From<NomadError> for EndpointError {
    fn from(e: NomadError) -> Self {
        Self::Remote(e.to_string())
    }
}
