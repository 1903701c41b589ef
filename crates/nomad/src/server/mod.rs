//! Server side of the protocol: a node's change log
//!
//! A [`NomadServer`] owns one append-only log of [`NomadChangeInfo`] records
//! and a small state record. Every mutative message is checked against the
//! state's mutation counter before anything else, then dispatched by kind.
//! Accepted messages bump the counter by exactly one; refused messages leave
//! everything untouched.

mod applicator;
mod state;

pub use applicator::{ChangeApplicator, PotentialApplicationResult};

use std::sync::Arc;

use dynconf_storage::{
    LogStorage, MetadataStorage, StorageKey, StorageNamespace, next_index,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::change::{ChangeRequestState, NomadChange, NomadChangeInfo};
use crate::codec::{decode, encode};
use crate::error::{NomadError, NomadResult};
use crate::messages::{
    AcceptRejectResponse, DiscoverResponse, MutativeMessage, Mutation, NomadServerMode,
    RejectionReason,
};
use state::ServerState;

const STATE_KEY: &str = "state";

fn config_key(version: u64) -> StorageKey {
    StorageKey::from(format!("config/{version:020}"))
}

/// A node's Nomad change log
pub struct NomadServer<C, T, S> {
    storage: S,
    namespace: StorageNamespace,
    applicator: Arc<dyn ChangeApplicator<C, T>>,
    /// Serializes check-then-write sequences within this process
    lock: Mutex<()>,
}

impl<C, T, S> std::fmt::Debug for NomadServer<C, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NomadServer")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<C, T, S> NomadServer<C, T, S>
where
    C: NomadChange,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: LogStorage + MetadataStorage,
{
    /// Create a server over `storage`, keeping its data under `namespace`
    pub fn new(
        storage: S,
        namespace: StorageNamespace,
        applicator: Arc<dyn ChangeApplicator<C, T>>,
    ) -> Self {
        Self {
            storage,
            namespace,
            applicator,
            lock: Mutex::new(()),
        }
    }

    /// The namespace this server keeps its data under
    pub fn namespace(&self) -> &StorageNamespace {
        &self.namespace
    }

    /// Read-only snapshot of this node's protocol state
    pub async fn discover(&self) -> NomadResult<DiscoverResponse<C>> {
        let _guard = self.lock.lock().await;

        let state = self.load_state().await?;
        let changes = self.read_changes().await?;
        let checkpoints = changes
            .iter()
            .filter(|info| {
                info.change_request_state == ChangeRequestState::Committed
                    && info.nomad_change.is_checkpoint()
            })
            .cloned()
            .collect();

        Ok(DiscoverResponse {
            mode: state.mode,
            mutative_message_count: state.mutative_message_count,
            last_mutation_host: state.last_mutation_host,
            last_mutation_user: state.last_mutation_user,
            last_mutation_timestamp: state.last_mutation_timestamp,
            current_version: state.current_version,
            highest_version: state.highest_version,
            latest_change: changes.last().cloned(),
            checkpoints,
        })
    }

    /// Handle a prepare, commit, rollback or takeover message
    pub async fn process(&self, message: MutativeMessage<C>) -> NomadResult<AcceptRejectResponse> {
        let _guard = self.lock.lock().await;

        let state = self.load_state().await?;
        if message.expected_mutative_message_count != state.mutative_message_count {
            return Ok(self.reject(
                &state,
                &message,
                RejectionReason::Dead,
                format!(
                    "Expected mutative message count {} but this node is at {}",
                    message.expected_mutative_message_count, state.mutative_message_count
                ),
            ));
        }

        match &message.mutation {
            Mutation::Prepare {
                change_uuid,
                version,
                change,
            } => {
                self.prepare(&state, &message, *change_uuid, *version, change)
                    .await
            }
            Mutation::Commit { change_uuid } => self.commit(&state, &message, *change_uuid).await,
            Mutation::Rollback { change_uuid } => {
                self.rollback(&state, &message, *change_uuid).await
            }
            Mutation::Takeover => self.takeover(&state, &message).await,
        }
    }

    /// Wipe the change log and every piece of state.
    ///
    /// Only meant for a passive node adopting its stripe's history.
    pub async fn reset(&self) -> NomadResult<()> {
        let _guard = self.lock.lock().await;

        self.storage.clear(&self.namespace).await?;
        for key in self.storage.keys(&self.namespace).await? {
            self.storage.delete(&self.namespace, &key).await?;
        }

        warn!("Change log of {} has been reset", self.namespace);
        Ok(())
    }

    /// The full change history, oldest first
    pub async fn get_all_nomad_changes(&self) -> NomadResult<Vec<NomadChangeInfo<C>>> {
        let _guard = self.lock.lock().await;
        self.read_changes().await
    }

    /// The committed configuration and its version, if any change was committed
    pub async fn get_current_config(&self) -> NomadResult<Option<(u64, T)>> {
        let _guard = self.lock.lock().await;

        let state = self.load_state().await?;
        if state.current_version == 0 {
            return Ok(None);
        }
        let config = self.load_config(state.current_version).await?;
        Ok(Some((state.current_version, config)))
    }

    async fn prepare(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
        change_uuid: Uuid,
        version: u64,
        change: &C,
    ) -> NomadResult<AcceptRejectResponse> {
        if state.mode != NomadServerMode::Accepting {
            return Ok(self.reject(
                state,
                message,
                RejectionReason::Bad,
                "Attempt to make a change while in PREPARED state".to_string(),
            ));
        }

        if version <= state.highest_version {
            return Ok(self.reject(
                state,
                message,
                RejectionReason::Bad,
                format!(
                    "Wrong change version {version}: must be greater than {}",
                    state.highest_version
                ),
            ));
        }

        let existing = if state.current_version > 0 {
            Some(self.load_config(state.current_version).await?)
        } else {
            None
        };

        let staged = match self.applicator.try_apply(existing.as_ref(), change) {
            PotentialApplicationResult::Allow(config) => config,
            PotentialApplicationResult::Reject(reason) => {
                return Ok(self.reject(state, message, RejectionReason::Unacceptable, reason));
            }
        };

        self.save_config(version, &staged).await?;

        let info = NomadChangeInfo {
            change_uuid,
            nomad_change: change.clone(),
            change_request_state: ChangeRequestState::Prepared,
            version,
            creation_host: message.mutation_host.clone(),
            creation_user: message.mutation_user.clone(),
            creation_timestamp: message.mutation_timestamp,
        };
        let index = next_index(self.storage.bounds(&self.namespace).await?);
        self.storage
            .append(&self.namespace, index, encode(&info)?)
            .await?;

        let mut next = state.accepted(message);
        next.mode = NomadServerMode::Prepared;
        next.highest_version = version;
        self.save_state(&next).await?;

        info!(
            "{}: prepared change {} (version {}): {}",
            self.namespace,
            change_uuid,
            version,
            change.summary()
        );
        Ok(AcceptRejectResponse::Accept)
    }

    async fn commit(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
        change_uuid: Uuid,
    ) -> NomadResult<AcceptRejectResponse> {
        let (index, latest) = match self.prepared_change(state, message, change_uuid).await? {
            Ok(prepared) => prepared,
            Err(rejection) => return Ok(rejection),
        };

        let committed = latest.with_state(ChangeRequestState::Committed);
        self.storage
            .replace_last(&self.namespace, index, encode(&committed)?)
            .await?;

        let mut next = state.accepted(message);
        next.mode = NomadServerMode::Accepting;
        next.current_version = latest.version;
        self.save_state(&next).await?;

        info!(
            "{}: committed change {} (version {})",
            self.namespace, change_uuid, latest.version
        );

        if let Err(e) = self.applicator.apply(&latest.nomad_change) {
            error!(
                "{}: committed change {} could not be applied at runtime: {}",
                self.namespace, change_uuid, e
            );
        }

        Ok(AcceptRejectResponse::Accept)
    }

    async fn rollback(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
        change_uuid: Uuid,
    ) -> NomadResult<AcceptRejectResponse> {
        let (index, latest) = match self.prepared_change(state, message, change_uuid).await? {
            Ok(prepared) => prepared,
            Err(rejection) => return Ok(rejection),
        };

        let rolled_back = latest.with_state(ChangeRequestState::RolledBack);
        self.storage
            .replace_last(&self.namespace, index, encode(&rolled_back)?)
            .await?;
        self.storage
            .delete(&self.namespace, &config_key(latest.version))
            .await?;

        let mut next = state.accepted(message);
        next.mode = NomadServerMode::Accepting;
        self.save_state(&next).await?;

        info!(
            "{}: rolled back change {} (version {})",
            self.namespace, change_uuid, latest.version
        );
        Ok(AcceptRejectResponse::Accept)
    }

    async fn takeover(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
    ) -> NomadResult<AcceptRejectResponse> {
        let next = state.accepted(message);
        self.save_state(&next).await?;

        info!(
            "{}: taken over by {}@{}",
            self.namespace, message.mutation_user, message.mutation_host
        );
        Ok(AcceptRejectResponse::Accept)
    }

    /// Locate the PREPARED record a commit or rollback refers to
    async fn prepared_change(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
        change_uuid: Uuid,
    ) -> NomadResult<Result<(u64, NomadChangeInfo<C>), AcceptRejectResponse>> {
        if state.mode != NomadServerMode::Prepared {
            return Ok(Err(self.reject(
                state,
                message,
                RejectionReason::Bad,
                format!(
                    "Attempt to {} while in ACCEPTING state",
                    message.mutation.name()
                ),
            )));
        }

        let (index, latest) = self.latest_entry().await?.ok_or_else(|| {
            NomadError::Corrupted(format!(
                "{} is in PREPARED mode but its change log is empty",
                self.namespace
            ))
        })?;

        if latest.change_uuid != change_uuid {
            return Ok(Err(self.reject(
                state,
                message,
                RejectionReason::Bad,
                format!(
                    "Received an alternative change UUID {change_uuid}: the prepared change is {}",
                    latest.change_uuid
                ),
            )));
        }

        if latest.change_request_state != ChangeRequestState::Prepared {
            return Err(NomadError::Corrupted(format!(
                "{} is in PREPARED mode but its latest change {} is {}",
                self.namespace, latest.change_uuid, latest.change_request_state
            )));
        }

        Ok(Ok((index, latest)))
    }

    fn reject(
        &self,
        state: &ServerState,
        message: &MutativeMessage<C>,
        reason: RejectionReason,
        details: String,
    ) -> AcceptRejectResponse {
        debug!(
            "{}: rejected {} from {}@{} ({}): {}",
            self.namespace,
            message.mutation.name(),
            message.mutation_user,
            message.mutation_host,
            reason,
            details
        );
        AcceptRejectResponse::Reject {
            reason,
            message: details,
            last_mutation_host: state.last_mutation_host.clone(),
            last_mutation_user: state.last_mutation_user.clone(),
        }
    }

    /// The persisted state, caught up with the log tail when a mutation
    /// stored its record but failed to store the state
    async fn load_state(&self) -> NomadResult<ServerState> {
        let state = match self
            .storage
            .get(&self.namespace, &StorageKey::from(STATE_KEY))
            .await?
        {
            Some(bytes) => decode(&bytes)?,
            None => ServerState::default(),
        };

        let Some((_, tail)) = self.latest_entry().await? else {
            return Ok(state);
        };
        match state.caught_up_with(&tail) {
            Some(caught_up) => {
                warn!(
                    "{}: state lags behind change {} ({}), catching up to mutative message count {}",
                    self.namespace,
                    tail.change_uuid,
                    tail.change_request_state,
                    caught_up.mutative_message_count
                );
                Ok(caught_up)
            }
            None => Ok(state),
        }
    }

    async fn save_state(&self, state: &ServerState) -> NomadResult<()> {
        self.storage
            .put(&self.namespace, StorageKey::from(STATE_KEY), encode(state)?)
            .await?;
        Ok(())
    }

    async fn load_config(&self, version: u64) -> NomadResult<T> {
        let bytes = self
            .storage
            .get(&self.namespace, &config_key(version))
            .await?
            .ok_or_else(|| {
                NomadError::Corrupted(format!(
                    "{} has no configuration for version {version}",
                    self.namespace
                ))
            })?;
        decode(&bytes)
    }

    async fn save_config(&self, version: u64, config: &T) -> NomadResult<()> {
        self.storage
            .put(&self.namespace, config_key(version), encode(config)?)
            .await?;
        Ok(())
    }

    async fn latest_entry(&self) -> NomadResult<Option<(u64, NomadChangeInfo<C>)>> {
        let Some((_, last)) = self.storage.bounds(&self.namespace).await? else {
            return Ok(None);
        };
        let entries = self
            .storage
            .read_range(&self.namespace, last, last + 1)
            .await?;
        match entries.into_iter().next() {
            Some((index, bytes)) => Ok(Some((index, decode(&bytes)?))),
            None => Ok(None),
        }
    }

    async fn read_changes(&self) -> NomadResult<Vec<NomadChangeInfo<C>>> {
        self.storage
            .read_all(&self.namespace)
            .await?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }
}
