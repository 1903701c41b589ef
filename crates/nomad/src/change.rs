//! Change records kept in a node's change log

use std::fmt::{self, Debug, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A mutation of a node's configuration.
///
/// Changes are immutable values. How a change transforms a configuration is
/// decided on the server side by a [`crate::ChangeApplicator`].
pub trait NomadChange:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// A human readable description of the change
    fn summary(&self) -> String;

    /// Whether a committed change of this kind is a safe recovery baseline
    fn is_checkpoint(&self) -> bool {
        false
    }
}

/// State of a single change record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeRequestState {
    /// Staged on the node, waiting for commit or rollback
    Prepared,
    /// Applied
    Committed,
    /// Discarded
    RolledBack,
}

impl ChangeRequestState {
    /// Whether the record reached a final state
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Prepared)
    }
}

impl Display for ChangeRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepared => write!(f, "PREPARED"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// A persisted change record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NomadChangeInfo<C> {
    /// Identifier shared by every node's copy of the change
    pub change_uuid: Uuid,
    /// The change itself
    pub nomad_change: C,
    /// Where the change is in its lifecycle
    pub change_request_state: ChangeRequestState,
    /// Version assigned at prepare time, strictly increasing per node
    pub version: u64,
    /// Host of the client that created the change
    pub creation_host: String,
    /// User of the client that created the change
    pub creation_user: String,
    /// When the change was created
    pub creation_timestamp: DateTime<Utc>,
}

impl<C: NomadChange> NomadChangeInfo<C> {
    /// The same record in another state
    pub fn with_state(&self, state: ChangeRequestState) -> Self {
        Self {
            change_request_state: state,
            ..self.clone()
        }
    }
}

impl<C: NomadChange> Display for NomadChangeInfo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} {} ({}@{} at {}): {}",
            self.change_uuid,
            self.version,
            self.change_request_state,
            self.creation_user,
            self.creation_host,
            self.creation_timestamp.to_rfc3339(),
            self.nomad_change.summary()
        )
    }
}
