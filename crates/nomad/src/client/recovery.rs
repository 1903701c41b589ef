//! Healing a cluster left half-way through a change
//!
//! Recovery never guesses: ambiguous states are only acted upon when the
//! operator forces the final state, and states that cannot be healed by a
//! commit or a rollback are reported untouched.

use std::fmt::{self, Display};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::change::{ChangeRequestState, NomadChange};
use crate::messages::{AcceptRejectResponse, MutativeMessage};

use super::NomadClient;
use super::analyzer::{ConsistencyAnalyzer, GlobalState};
use super::change::{Decision, ServerFailure, send_final_each};
use super::discovery::discover_cluster;
use super::endpoint::{NodeAddress, NomadEndpoint};
use super::fanout::fan_out;
use super::receiver::RecoveryResultsReceiver;

/// Final state an operator imposes on a prepared change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedState {
    /// Commit it
    Commit,
    /// Roll it back
    Rollback,
}

impl Display for ForcedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

impl std::str::FromStr for ForcedState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "commit" => Ok(Self::Commit),
            "rollback" => Ok(Self::Rollback),
            other => Err(format!("unknown final state '{other}': expected commit or rollback")),
        }
    }
}

/// How a recovery run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Every node accepts changes already
    NothingToRecover,
    /// Every prepared node was brought to the final state
    Recovered {
        /// The action taken
        action: ForcedState,
        /// Nodes that were fixed
        nodes: Vec<NodeAddress>,
    },
    /// The cluster was left untouched
    Unrecoverable {
        /// The classified state
        state: GlobalState,
        /// Why recovery did not act
        reason: String,
        /// The latest checkpoint shared by every responding node
        checkpoint: Option<Uuid>,
    },
    /// Recovery acted but some nodes did not follow
    Incomplete {
        /// The action attempted, if the run got that far
        action: Option<ForcedState>,
        /// The failures
        failures: Vec<ServerFailure>,
    },
}

impl RecoveryOutcome {
    /// Whether the cluster now accepts changes
    pub fn is_success(&self) -> bool {
        matches!(self, Self::NothingToRecover | Self::Recovered { .. })
    }
}

impl Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToRecover => write!(f, "nothing to recover"),
            Self::Recovered { action, nodes } => {
                write!(f, "recovered with {action} on {} node(s)", nodes.len())
            }
            Self::Unrecoverable {
                state,
                reason,
                checkpoint,
            } => {
                write!(f, "cannot recover from {state}: {reason}")?;
                if let Some(checkpoint) = checkpoint {
                    write!(f, " (latest common checkpoint: {checkpoint})")?;
                }
                Ok(())
            }
            Self::Incomplete { action, failures } => {
                match action {
                    Some(action) => write!(f, "{action} incomplete")?,
                    None => write!(f, "takeover incomplete")?,
                }
                for failure in failures {
                    write!(f, "; {}: {}", failure.node, failure.reason)?;
                }
                Ok(())
            }
        }
    }
}

/// Decide what to do for a classified cluster
fn decide(state: GlobalState, forced: Option<ForcedState>) -> Result<Option<ForcedState>, String> {
    use GlobalState::*;

    match (state, forced) {
        (Accepting, _) => Ok(None),

        (PartiallyCommitted, None | Some(ForcedState::Commit)) => Ok(Some(ForcedState::Commit)),
        (PartiallyCommitted, Some(ForcedState::Rollback)) => {
            Err("the change is already committed on some nodes".to_string())
        }

        (PartiallyRolledBack | PartiallyPrepared, None | Some(ForcedState::Rollback)) => {
            Ok(Some(ForcedState::Rollback))
        }
        (PartiallyRolledBack, Some(ForcedState::Commit)) => {
            Err("the change is already rolled back on some nodes".to_string())
        }
        (PartiallyPrepared, Some(ForcedState::Commit)) => {
            Err("the prepared change is not the latest change on every node".to_string())
        }

        (Prepared | MaybePrepared, Some(forced)) => Ok(Some(forced)),
        (MaybePartiallyCommitted, Some(ForcedState::Commit)) => Ok(Some(ForcedState::Commit)),
        (MaybePartiallyRolledBack, Some(ForcedState::Rollback)) => {
            Ok(Some(ForcedState::Rollback))
        }
        (MaybePartiallyCommitted, Some(ForcedState::Rollback)) => {
            Err("the change is already committed on some nodes".to_string())
        }
        (MaybePartiallyRolledBack, Some(ForcedState::Commit)) => {
            Err("the change is already rolled back on some nodes".to_string())
        }
        (Prepared | MaybePrepared | MaybePartiallyCommitted | MaybePartiallyRolledBack, None) => {
            Err("the final state of the change cannot be decided; force commit or rollback".to_string())
        }

        (MaybeUnknown | Unknown | Inconsistent | ConcurrentAccess | DiscoveryFailure, _) => {
            Err(state.description().to_string())
        }
    }
}

/// One recovery attempt
pub(crate) struct RecoveryProcess<'a, C: NomadChange> {
    client: &'a NomadClient<C>,
}

impl<'a, C: NomadChange> RecoveryProcess<'a, C> {
    pub(crate) fn new(client: &'a NomadClient<C>) -> Self {
        Self { client }
    }

    pub(crate) async fn recover<R>(
        &self,
        receiver: &R,
        expected_node_count: usize,
        forced: Option<ForcedState>,
    ) -> RecoveryOutcome
    where
        R: RecoveryResultsReceiver<C> + ?Sized,
    {
        let outcome = self.run(receiver, expected_node_count, forced).await;
        receiver.recovery_done(&outcome);
        outcome
    }

    async fn run<R>(
        &self,
        receiver: &R,
        expected_node_count: usize,
        forced: Option<ForcedState>,
    ) -> RecoveryOutcome
    where
        R: RecoveryResultsReceiver<C> + ?Sized,
    {
        let client = self.client;
        let analyzer = discover_cluster(
            &client.config,
            &client.endpoints,
            expected_node_count,
            receiver,
        )
        .await;
        let state = analyzer.global_state();

        let action = match decide(state, forced) {
            Ok(None) => {
                info!("Cluster is {}: nothing to recover", state);
                return RecoveryOutcome::NothingToRecover;
            }
            Ok(Some(action)) => action,
            Err(reason) => {
                warn!("Not recovering from {}: {}", state, reason);
                return RecoveryOutcome::Unrecoverable {
                    state,
                    reason,
                    checkpoint: analyzer.checkpoint().map(|c| c.change_uuid),
                };
            }
        };

        info!("Recovering from {} with {}", state, action);

        let taken_over = match self.takeover(receiver, &analyzer).await {
            Ok(taken_over) => taken_over,
            Err(failures) => {
                return RecoveryOutcome::Incomplete {
                    action: None,
                    failures,
                };
            }
        };

        // Fix every node still holding a prepared change, at its post-takeover count
        let targets: Vec<_> = taken_over
            .into_iter()
            .filter_map(|(endpoint, count)| {
                let response = analyzer.discovery_response(endpoint.address())?;
                let latest = response.latest_change.as_ref()?;
                (latest.change_request_state == ChangeRequestState::Prepared)
                    .then(|| (endpoint, (count, latest.change_uuid)))
            })
            .collect();

        let decision = match action {
            ForcedState::Commit => {
                receiver.start_commit();
                Decision::Commit
            }
            ForcedState::Rollback => {
                receiver.start_rollback();
                Decision::Rollback
            }
        };

        let mut nodes = Vec::new();
        let mut failures = Vec::new();
        for (node, failure) in send_final_each(client, targets, decision).await {
            match (failure, action) {
                (None, ForcedState::Commit) => {
                    receiver.committed(&node);
                    nodes.push(node);
                }
                (None, ForcedState::Rollback) => {
                    receiver.rolled_back(&node);
                    nodes.push(node);
                }
                (Some(reason), ForcedState::Commit) => {
                    receiver.commit_fail(&node, &reason);
                    failures.push(ServerFailure { node, reason });
                }
                (Some(reason), ForcedState::Rollback) => {
                    receiver.rollback_fail(&node, &reason);
                    failures.push(ServerFailure { node, reason });
                }
            }
        }

        match action {
            ForcedState::Commit => receiver.end_commit(),
            ForcedState::Rollback => receiver.end_rollback(),
        }

        if failures.is_empty() {
            RecoveryOutcome::Recovered { action, nodes }
        } else {
            RecoveryOutcome::Incomplete {
                action: Some(action),
                failures,
            }
        }
    }

    /// Take over every discovered node; returns each node's next count
    async fn takeover<R>(
        &self,
        receiver: &R,
        analyzer: &ConsistencyAnalyzer<C>,
    ) -> Result<Vec<(Arc<dyn NomadEndpoint<C>>, u64)>, Vec<ServerFailure>>
    where
        R: RecoveryResultsReceiver<C> + ?Sized,
    {
        receiver.start_takeover();

        let targets: Vec<_> = self
            .client
            .endpoints
            .iter()
            .filter_map(|endpoint| {
                analyzer
                    .discovery_response(endpoint.address())
                    .map(|r| (endpoint.clone(), r.mutative_message_count))
            })
            .collect();
        let counts: Vec<_> = targets.iter().map(|(e, count)| (e.clone(), *count)).collect();

        let host = self.client.host.clone();
        let user = self.client.user.clone();
        let timestamp = Utc::now();
        let results = fan_out(&self.client.config, "takeover", targets, |endpoint, count| {
            let message = MutativeMessage::takeover(count, host.clone(), user.clone(), timestamp);
            async move { endpoint.send(message).await }
        })
        .await;

        let mut taken_over = Vec::new();
        let mut failures = Vec::new();
        for ((endpoint, count), (node, result)) in counts.into_iter().zip(results) {
            let reason = match result {
                Ok(AcceptRejectResponse::Accept) => {
                    receiver.taken_over(&node);
                    taken_over.push((endpoint, count + 1));
                    continue;
                }
                Ok(AcceptRejectResponse::Reject {
                    reason, message, ..
                }) => format!("{reason}: {message}"),
                Err(e) => e.to_string(),
            };
            receiver.takeover_fail(&node, &reason);
            failures.push(ServerFailure { node, reason });
        }

        receiver.end_takeover();
        if failures.is_empty() {
            Ok(taken_over)
        } else {
            Err(failures)
        }
    }
}
