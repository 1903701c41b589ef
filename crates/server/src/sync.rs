//! Alignment of a passive node's configuration with its active node
//!
//! The active node exports its whole change log and license as
//! [`DynamicConfigSyncData`]. The passive node then checks that its own log
//! is a prefix of the active one, settles a change it may have left
//! PREPARED, and replays what it is missing with the original provenance of
//! every change. A freshly activated node joining a stripe with the same
//! topology adopts the stripe's history instead of its own.

use std::fmt::{self, Display};
use std::sync::Arc;

use bytes::Bytes;
use dynconf_model::{Cluster, DynamicConfigNomadChange, ModelError};
use dynconf_nomad::{
    AcceptRejectResponse, ChangeRequestState, MutativeMessage, NomadChangeInfo, NomadError,
};
use dynconf_storage::{LogStorage, MetadataStorage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ConfigNomadServer;
use crate::license::LicenseService;

/// A change record of the configuration repository
pub type ConfigChangeInfo = NomadChangeInfo<DynamicConfigNomadChange>;

/// What a passive node needs from its active node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicConfigSyncData {
    /// The active node's full change log, oldest first
    pub nomad_changes: Vec<ConfigChangeInfo>,
    /// The active node's license content
    pub license: Option<String>,
}

impl DynamicConfigSyncData {
    /// JSON encoding sent to the passive node
    pub fn encode(&self) -> Result<Bytes, SyncError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Decode what [`Self::encode`] produced
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

/// How a sync that succeeded leaves the passive node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing changed, the node keeps running
    Ok,
    /// The node caught up and must restart to run the new configuration
    RestartRequired,
    /// The node adopted a new history and must wipe its data and restart
    DestructiveResetRequired,
}

impl Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "in sync"),
            Self::RestartRequired => write!(f, "restart required"),
            Self::DestructiveResetRequired => write!(f, "destructive reset required"),
        }
    }
}

/// Failures of a passive sync. Every one of them must stop the node.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The passive node knows changes the active node does not
    #[error("Passive has more configuration changes")]
    PassiveAhead,

    /// The two change logs diverge
    #[error("Passive cannot sync because the configuration change history does not match")]
    HistoryMismatch,

    /// The active node itself has an unsettled change
    #[error("Active has some PREPARED configuration changes that are not yet committed.")]
    ActiveNotCommitted,

    /// The sync data cannot be applied to this node
    #[error("Invalid sync state: {0}")]
    InvalidState(String),

    /// The passive node's Nomad server refused a replayed message
    #[error("{0}")]
    Rejected(String),

    /// The passive node's Nomad server failed
    #[error("Nomad error: {0}")]
    Nomad(#[from] NomadError),

    /// The sync data could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// The active node's license could not be installed
    #[error("License error: {0}")]
    License(#[from] ModelError),
}

/// Passive sync for one node
pub struct DynamicConfigurationPassiveSync<S> {
    server: Arc<ConfigNomadServer<S>>,
    license_service: Arc<dyn LicenseService>,
}

impl<S> DynamicConfigurationPassiveSync<S>
where
    S: LogStorage + MetadataStorage,
{
    /// Sync over the node's Nomad server and license service
    pub fn new(server: Arc<ConfigNomadServer<S>>, license_service: Arc<dyn LicenseService>) -> Self {
        Self {
            server,
            license_service,
        }
    }

    /// Export this node's history and license, as an active node
    pub async fn get_sync_data(&self) -> Result<Bytes, SyncError> {
        DynamicConfigSyncData {
            nomad_changes: self.server.get_all_nomad_changes().await?,
            license: self.license_service.license_content(),
        }
        .encode()
    }

    /// Align this node, as a passive node, with the active node's sync data
    pub async fn sync(&self, active_sync_data: &[u8]) -> Result<SyncOutcome, SyncError> {
        let data = DynamicConfigSyncData::decode(active_sync_data)?;
        let active = &data.nomad_changes;
        let passive = self.server.get_all_nomad_changes().await?;

        if active.is_empty() {
            return Err(SyncError::InvalidState(
                "Active has no configuration change".to_string(),
            ));
        }
        if passive.len() > active.len() {
            return Err(SyncError::PassiveAhead);
        }

        let mut outcome = SyncOutcome::Ok;

        if is_new_pre_activated_passive(&passive, active) {
            warn!(
                "Passive was activated on its own with the same topology as its stripe: adopting the history of the active"
            );
            self.server.reset().await?;
            self.replay(active).await?;
            outcome = SyncOutcome::DestructiveResetRequired;
        } else {
            for (position, (passive_change, active_change)) in
                passive.iter().zip(active.iter()).enumerate()
            {
                if passive_change == active_change {
                    continue;
                }

                let is_last = position == passive.len() - 1;
                if is_last && is_settled_version_of(passive_change, active_change) {
                    if self.fix_prepared_change(active_change).await? {
                        outcome = SyncOutcome::RestartRequired;
                    }
                } else {
                    debug!(
                        "Change history differs at position {}: passive has {}, active has {}",
                        position, passive_change, active_change
                    );
                    return Err(SyncError::HistoryMismatch);
                }
            }

            if self.replay(&active[passive.len()..]).await? {
                outcome = SyncOutcome::RestartRequired;
            }
        }

        if self.sync_license(data.license.as_deref())? && outcome == SyncOutcome::Ok {
            outcome = SyncOutcome::RestartRequired;
        }

        info!("Passive sync done: {}", outcome);
        Ok(outcome)
    }

    /// Commit or roll back the change this node left PREPARED the way the
    /// active node settled it. Returns whether the configuration changed.
    async fn fix_prepared_change(&self, active_change: &ConfigChangeInfo) -> Result<bool, SyncError> {
        let count = self.server.discover().await?.mutative_message_count;
        let committed = active_change.change_request_state == ChangeRequestState::Committed;

        info!(
            "Settling prepared change {} as {}",
            active_change.change_uuid, active_change.change_request_state
        );
        let message = final_message(count, active_change, committed);
        let response = self.server.process(message).await?;
        check_final(&response, active_change)?;

        Ok(committed)
    }

    /// Prepare and settle every change in order, as the active node did.
    /// Returns whether any change was committed.
    async fn replay(&self, changes: &[ConfigChangeInfo]) -> Result<bool, SyncError> {
        let mut committed_any = false;

        for change in changes {
            let committed = match change.change_request_state {
                ChangeRequestState::Committed => true,
                ChangeRequestState::RolledBack => false,
                ChangeRequestState::Prepared => return Err(SyncError::ActiveNotCommitted),
            };

            let count = self.server.discover().await?.mutative_message_count;
            let prepare = MutativeMessage::prepare(
                count,
                change.creation_host.clone(),
                change.creation_user.clone(),
                change.creation_timestamp,
                change.change_uuid,
                change.version,
                change.nomad_change.clone(),
            );
            if let AcceptRejectResponse::Reject {
                reason, message, ..
            } = self.server.process(prepare).await?
            {
                return Err(SyncError::Rejected(format!(
                    "Prepare message is rejected by Nomad. Reason for rejection is {reason}: {message}"
                )));
            }

            let response = self
                .server
                .process(final_message(count + 1, change, committed))
                .await?;
            check_final(&response, change)?;

            debug!("Replayed change {}", change);
            committed_any |= committed;
        }

        Ok(committed_any)
    }

    /// Install the active node's license if it differs. Returns whether it did.
    fn sync_license(&self, active_license: Option<&str>) -> Result<bool, SyncError> {
        let passive_license = self.license_service.license_content();
        if passive_license.as_deref() == active_license {
            return Ok(false);
        }

        match active_license {
            Some(content) => {
                self.license_service.install(content)?;
            }
            None => self.license_service.remove(),
        }
        info!("License synced from the active node");
        Ok(true)
    }
}

fn final_message(
    count: u64,
    change: &ConfigChangeInfo,
    committed: bool,
) -> MutativeMessage<DynamicConfigNomadChange> {
    if committed {
        MutativeMessage::commit(
            count,
            change.creation_host.clone(),
            change.creation_user.clone(),
            change.creation_timestamp,
            change.change_uuid,
        )
    } else {
        MutativeMessage::rollback(
            count,
            change.creation_host.clone(),
            change.creation_user.clone(),
            change.creation_timestamp,
            change.change_uuid,
        )
    }
}

fn check_final(response: &AcceptRejectResponse, change: &ConfigChangeInfo) -> Result<(), SyncError> {
    match response {
        AcceptRejectResponse::Accept => Ok(()),
        AcceptRejectResponse::Reject {
            reason, message, ..
        } => Err(SyncError::Rejected(format!(
            "Unexpected commit failure. Reason for failure is {reason}: {message}. Change: {}",
            change.change_uuid
        ))),
    }
}

/// The passive record is the PREPARED form of what the active settled
fn is_settled_version_of(passive: &ConfigChangeInfo, active: &ConfigChangeInfo) -> bool {
    passive.change_request_state == ChangeRequestState::Prepared
        && active.change_request_state.is_terminal()
        && passive.with_state(active.change_request_state) == *active
}

/// A node activated on its own joins a stripe whose current topology is the
/// one the node was activated with
fn is_new_pre_activated_passive(passive: &[ConfigChangeInfo], active: &[ConfigChangeInfo]) -> bool {
    let ([passive_change], Some(first_active)) = (passive, active.first()) else {
        return false;
    };

    if passive_change.change_request_state != ChangeRequestState::Committed
        || !passive_change.nomad_change.is_activation()
        || passive_change.change_uuid == first_active.change_uuid
    {
        return false;
    }

    let passive_topology = passive_change.nomad_change.topology();
    passive_topology.is_some() && passive_topology == latest_committed_topology(active)
}

fn latest_committed_topology(changes: &[ConfigChangeInfo]) -> Option<&Cluster> {
    changes
        .iter()
        .rev()
        .filter(|change| change.change_request_state == ChangeRequestState::Committed)
        .find_map(|change| change.nomad_change.topology())
}
