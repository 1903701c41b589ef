//! Wire types exchanged between a Nomad client and a node

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::NomadChangeInfo;

/// Whether a node accepts new changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NomadServerMode {
    /// No change in flight
    Accepting,
    /// A change is prepared and waits for commit or rollback
    Prepared,
}

impl Display for NomadServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepting => write!(f, "ACCEPTING"),
            Self::Prepared => write!(f, "PREPARED"),
        }
    }
}

/// Snapshot of a node's Nomad state, as returned by discovery
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse<C> {
    /// Current mode
    pub mode: NomadServerMode,
    /// Number of accepted mutative messages so far
    pub mutative_message_count: u64,
    /// Host of the last accepted mutative message
    pub last_mutation_host: Option<String>,
    /// User of the last accepted mutative message
    pub last_mutation_user: Option<String>,
    /// Time of the last accepted mutative message
    pub last_mutation_timestamp: Option<DateTime<Utc>>,
    /// Version of the last committed change, 0 if none
    pub current_version: u64,
    /// Highest version ever prepared, 0 if none
    pub highest_version: u64,
    /// Most recent change record
    pub latest_change: Option<NomadChangeInfo<C>>,
    /// Committed checkpoint changes, oldest first
    pub checkpoints: Vec<NomadChangeInfo<C>>,
}

/// The operation carried by a [`MutativeMessage`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Mutation<C> {
    /// Stage a new change
    #[serde(rename_all = "camelCase")]
    Prepare {
        /// Identifier of the new change
        change_uuid: Uuid,
        /// Version the change gets on the node
        version: u64,
        /// The change
        change: C,
    },
    /// Apply the prepared change
    #[serde(rename_all = "camelCase")]
    Commit {
        /// Identifier of the prepared change
        change_uuid: Uuid,
    },
    /// Discard the prepared change
    #[serde(rename_all = "camelCase")]
    Rollback {
        /// Identifier of the prepared change
        change_uuid: Uuid,
    },
    /// Become the owner of the node's in-flight state
    Takeover,
}

impl<C> Mutation<C> {
    /// Short name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Commit { .. } => "commit",
            Self::Rollback { .. } => "rollback",
            Self::Takeover => "takeover",
        }
    }
}

/// A message that changes a node's Nomad state.
///
/// Every mutative message carries the mutation counter the sender expects
/// the node to be at. A node whose counter differs refuses the message, which
/// makes every mutation a compare-and-set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutativeMessage<C> {
    /// Counter value the node must currently hold
    pub expected_mutative_message_count: u64,
    /// Host of the sender
    pub mutation_host: String,
    /// User of the sender
    pub mutation_user: String,
    /// When the sender created the message
    pub mutation_timestamp: DateTime<Utc>,
    /// The operation
    pub mutation: Mutation<C>,
}

impl<C> MutativeMessage<C> {
    fn new(
        expected_mutative_message_count: u64,
        mutation_host: impl Into<String>,
        mutation_user: impl Into<String>,
        mutation_timestamp: DateTime<Utc>,
        mutation: Mutation<C>,
    ) -> Self {
        Self {
            expected_mutative_message_count,
            mutation_host: mutation_host.into(),
            mutation_user: mutation_user.into(),
            mutation_timestamp,
            mutation,
        }
    }

    /// Build a prepare message
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        expected_mutative_message_count: u64,
        mutation_host: impl Into<String>,
        mutation_user: impl Into<String>,
        mutation_timestamp: DateTime<Utc>,
        change_uuid: Uuid,
        version: u64,
        change: C,
    ) -> Self {
        Self::new(
            expected_mutative_message_count,
            mutation_host,
            mutation_user,
            mutation_timestamp,
            Mutation::Prepare {
                change_uuid,
                version,
                change,
            },
        )
    }

    /// Build a commit message
    pub fn commit(
        expected_mutative_message_count: u64,
        mutation_host: impl Into<String>,
        mutation_user: impl Into<String>,
        mutation_timestamp: DateTime<Utc>,
        change_uuid: Uuid,
    ) -> Self {
        Self::new(
            expected_mutative_message_count,
            mutation_host,
            mutation_user,
            mutation_timestamp,
            Mutation::Commit { change_uuid },
        )
    }

    /// Build a rollback message
    pub fn rollback(
        expected_mutative_message_count: u64,
        mutation_host: impl Into<String>,
        mutation_user: impl Into<String>,
        mutation_timestamp: DateTime<Utc>,
        change_uuid: Uuid,
    ) -> Self {
        Self::new(
            expected_mutative_message_count,
            mutation_host,
            mutation_user,
            mutation_timestamp,
            Mutation::Rollback { change_uuid },
        )
    }

    /// Build a takeover message
    pub fn takeover(
        expected_mutative_message_count: u64,
        mutation_host: impl Into<String>,
        mutation_user: impl Into<String>,
        mutation_timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            expected_mutative_message_count,
            mutation_host,
            mutation_user,
            mutation_timestamp,
            Mutation::Takeover,
        )
    }
}

/// Why a node refused a mutative message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The expected mutation counter is stale: another client got there first
    Dead,
    /// The message violates the protocol (wrong mode, unknown change, old version)
    Bad,
    /// The change itself was refused or failed to apply
    Unacceptable,
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dead => write!(f, "DEAD"),
            Self::Bad => write!(f, "BAD"),
            Self::Unacceptable => write!(f, "UNACCEPTABLE"),
        }
    }
}

/// A node's answer to a mutative message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AcceptRejectResponse {
    /// The message was applied
    Accept,
    /// The message was refused and nothing changed
    #[serde(rename_all = "camelCase")]
    Reject {
        /// Category of the refusal
        reason: RejectionReason,
        /// Details
        message: String,
        /// Host of the last accepted mutation on the node
        last_mutation_host: Option<String>,
        /// User of the last accepted mutation on the node
        last_mutation_user: Option<String>,
    },
}

impl AcceptRejectResponse {
    /// Whether the message was applied
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// The refusal category, if refused
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Accept => None,
            Self::Reject { reason, .. } => Some(*reason),
        }
    }

    /// The refusal details, if refused
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            Self::Accept => None,
            Self::Reject { message, .. } => Some(message),
        }
    }
}
