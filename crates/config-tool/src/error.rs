//! Error types of the configuration tool

use std::path::PathBuf;

use thiserror::Error;

/// Result type of the configuration tool
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a `dynconf` command
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing the configuration directory failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory involved
        path: PathBuf,
        /// The underlying failure
        source: std::io::Error,
    },

    /// `cluster.json` could not be read or written
    #[error("invalid cluster file: {0}")]
    ClusterFile(#[from] serde_json::Error),

    /// The configuration is invalid
    #[error(transparent)]
    Model(#[from] dynconf_model::ModelError),

    /// A node repository failed
    #[error(transparent)]
    Nomad(#[from] dynconf_nomad::NomadError),

    /// An attached node could not catch up with its stripe
    #[error("sync failed: {0}")]
    Sync(#[from] dynconf_server::SyncError),

    /// The command does not fit the cluster
    #[error("{0}")]
    Usage(String),

    /// The change was not applied on every node
    #[error("{0}")]
    ChangeFailed(String),

    /// The repair did not complete
    #[error("{0}")]
    RepairFailed(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
