//! Persisted per-node protocol state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeRequestState, NomadChangeInfo};
use crate::messages::{MutativeMessage, NomadServerMode};

/// Everything a node remembers about the protocol besides the log itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ServerState {
    pub mode: NomadServerMode,
    pub mutative_message_count: u64,
    pub last_mutation_host: Option<String>,
    pub last_mutation_user: Option<String>,
    pub last_mutation_timestamp: Option<DateTime<Utc>>,
    pub current_version: u64,
    pub highest_version: u64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            mode: NomadServerMode::Accepting,
            mutative_message_count: 0,
            last_mutation_host: None,
            last_mutation_user: None,
            last_mutation_timestamp: None,
            current_version: 0,
            highest_version: 0,
        }
    }
}

impl ServerState {
    /// The state after accepting `message`: counter bumped, sender recorded
    pub fn accepted<C>(&self, message: &MutativeMessage<C>) -> Self {
        Self {
            mutative_message_count: self.mutative_message_count + 1,
            last_mutation_host: Some(message.mutation_host.clone()),
            last_mutation_user: Some(message.mutation_user.clone()),
            last_mutation_timestamp: Some(message.mutation_timestamp),
            ..self.clone()
        }
    }

    /// The state implied by the latest log record, when this one lags behind it.
    ///
    /// A mutation writes the log before the state. If the state write fails,
    /// the log tail is one accepted message ahead and this recomputes what
    /// the state write would have stored. Returns `None` when both agree.
    pub fn caught_up_with<C>(&self, tail: &NomadChangeInfo<C>) -> Option<Self> {
        match (self.mode, tail.change_request_state) {
            (NomadServerMode::Accepting, ChangeRequestState::Prepared) => Some(Self {
                mode: NomadServerMode::Prepared,
                mutative_message_count: self.mutative_message_count + 1,
                last_mutation_host: Some(tail.creation_host.clone()),
                last_mutation_user: Some(tail.creation_user.clone()),
                last_mutation_timestamp: Some(tail.creation_timestamp),
                highest_version: self.highest_version.max(tail.version),
                ..self.clone()
            }),
            (NomadServerMode::Prepared, ChangeRequestState::Committed) => Some(Self {
                mode: NomadServerMode::Accepting,
                mutative_message_count: self.mutative_message_count + 1,
                current_version: tail.version,
                ..self.clone()
            }),
            (NomadServerMode::Prepared, ChangeRequestState::RolledBack) => Some(Self {
                mode: NomadServerMode::Accepting,
                mutative_message_count: self.mutative_message_count + 1,
                ..self.clone()
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use uuid::Uuid;

    fn record(state: ChangeRequestState, version: u64) -> NomadChangeInfo<String> {
        NomadChangeInfo {
            change_uuid: Uuid::new_v4(),
            nomad_change: "change".to_string(),
            change_request_state: state,
            version,
            creation_host: "admin-host".to_string(),
            creation_user: "admin".to_string(),
            creation_timestamp: Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap(),
        }
    }

    fn prepared_state() -> ServerState {
        ServerState {
            mode: NomadServerMode::Prepared,
            mutative_message_count: 3,
            highest_version: 2,
            current_version: 1,
            ..ServerState::default()
        }
    }

    #[test]
    fn test_agreeing_state_is_kept() {
        assert!(
            prepared_state()
                .caught_up_with(&record(ChangeRequestState::Prepared, 2))
                .is_none()
        );
        let accepting = ServerState {
            mode: NomadServerMode::Accepting,
            ..prepared_state()
        };
        assert!(
            accepting
                .caught_up_with(&record(ChangeRequestState::Committed, 2))
                .is_none()
        );
        assert!(
            accepting
                .caught_up_with(&record(ChangeRequestState::RolledBack, 2))
                .is_none()
        );
    }

    #[test]
    fn test_lost_prepare_state() {
        let state = ServerState {
            mode: NomadServerMode::Accepting,
            mutative_message_count: 2,
            current_version: 1,
            highest_version: 1,
            ..ServerState::default()
        };

        let caught_up = state
            .caught_up_with(&record(ChangeRequestState::Prepared, 2))
            .unwrap();
        assert_eq!(caught_up.mode, NomadServerMode::Prepared);
        assert_eq!(caught_up.mutative_message_count, 3);
        assert_eq!(caught_up.highest_version, 2);
        assert_eq!(caught_up.current_version, 1);
        assert_eq!(caught_up.last_mutation_host.as_deref(), Some("admin-host"));
    }

    #[test]
    fn test_lost_commit_and_rollback_state() {
        let committed = prepared_state()
            .caught_up_with(&record(ChangeRequestState::Committed, 2))
            .unwrap();
        assert_eq!(committed.mode, NomadServerMode::Accepting);
        assert_eq!(committed.mutative_message_count, 4);
        assert_eq!(committed.current_version, 2);

        let rolled_back = prepared_state()
            .caught_up_with(&record(ChangeRequestState::RolledBack, 2))
            .unwrap();
        assert_eq!(rolled_back.mode, NomadServerMode::Accepting);
        assert_eq!(rolled_back.mutative_message_count, 4);
        assert_eq!(rolled_back.current_version, 1);
        assert_eq!(rolled_back.highest_version, 2);
    }
}
