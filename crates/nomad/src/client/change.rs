//! Client-driven application of one change across every node
//!
//! `discover → (ACCEPTING ? prepare : abort) → (all prepared ? commit : rollback)`

use std::fmt::{self, Display};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::change::NomadChange;
use crate::messages::{AcceptRejectResponse, MutativeMessage, RejectionReason};

use super::NomadClient;
use super::analyzer::GlobalState;
use super::discovery::discover_cluster;
use super::endpoint::{NodeAddress, NomadEndpoint};
use super::fanout::fan_out;
use super::receiver::ChangeResultsReceiver;

/// Phase of a change run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangePhase {
    /// Staging the change
    Prepare,
    /// Applying the change
    Commit,
    /// Discarding the change
    Rollback,
}

impl Display for ChangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// A node that did not go along with a phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerFailure {
    /// The node
    pub node: NodeAddress,
    /// Why
    pub reason: String,
}

/// How a change run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Committed on every node
    Applied {
        /// Identifier of the change
        change_uuid: Uuid,
        /// Version the change got
        version: u64,
    },
    /// Nothing was attempted because the cluster was not ready
    Aborted {
        /// The blocking cluster state
        state: GlobalState,
    },
    /// At least one node refused the change and every prepared node rolled back
    Rejected {
        /// Identifier of the change
        change_uuid: Uuid,
        /// The refusals
        rejections: Vec<ServerFailure>,
    },
    /// The run was interrupted and the cluster may need a recovery
    MayNeedRecovery {
        /// Identifier of the change
        change_uuid: Uuid,
        /// Phase that failed
        phase: ChangePhase,
        /// The failures
        failures: Vec<ServerFailure>,
    },
}

impl ChangeOutcome {
    /// Whether the change is committed everywhere
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl Display for ChangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied {
                change_uuid,
                version,
            } => write!(f, "change {change_uuid} applied at version {version}"),
            Self::Aborted { state } => {
                write!(f, "change aborted: cluster is {state} ({})", state.description())
            }
            Self::Rejected {
                change_uuid,
                rejections,
            } => {
                write!(f, "change {change_uuid} rejected")?;
                for rejection in rejections {
                    write!(f, "; {}: {}", rejection.node, rejection.reason)?;
                }
                Ok(())
            }
            Self::MayNeedRecovery {
                change_uuid,
                phase,
                failures,
            } => {
                write!(
                    f,
                    "change {change_uuid} failed during {phase}, a repair may be needed"
                )?;
                for failure in failures {
                    write!(f, "; {}: {}", failure.node, failure.reason)?;
                }
                Ok(())
            }
        }
    }
}

type Target<C> = (Arc<dyn NomadEndpoint<C>>, u64);

/// One attempt at applying a change
pub(crate) struct ChangeProcess<'a, C: NomadChange> {
    client: &'a NomadClient<C>,
}

impl<'a, C: NomadChange> ChangeProcess<'a, C> {
    pub(crate) fn new(client: &'a NomadClient<C>) -> Self {
        Self { client }
    }

    pub(crate) async fn apply_change<R>(&self, receiver: &R, change: C) -> ChangeOutcome
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        let outcome = self.run(receiver, change).await;
        receiver.change_done(&outcome);
        outcome
    }

    async fn run<R>(&self, receiver: &R, change: C) -> ChangeOutcome
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        let client = self.client;
        let analyzer = discover_cluster(
            &client.config,
            &client.endpoints,
            client.endpoints.len(),
            receiver,
        )
        .await;

        let state = analyzer.global_state();
        if state != GlobalState::Accepting {
            warn!("Not applying '{}': cluster is {}", change.summary(), state);
            return ChangeOutcome::Aborted { state };
        }

        let mut targets: Vec<Target<C>> = Vec::with_capacity(client.endpoints.len());
        for endpoint in &client.endpoints {
            match analyzer.discovery_response(endpoint.address()) {
                Some(response) => targets.push((endpoint.clone(), response.mutative_message_count)),
                None => {
                    return ChangeOutcome::Aborted {
                        state: GlobalState::DiscoveryFailure,
                    };
                }
            }
        }

        let change_uuid = Uuid::new_v4();
        let version = analyzer
            .responses()
            .values()
            .map(|r| r.highest_version)
            .max()
            .unwrap_or(0)
            + 1;

        info!(
            "Preparing change {} (version {}): {}",
            change_uuid,
            version,
            change.summary()
        );
        let (prepared, failures, uncertain) = self
            .prepare(receiver, targets, change_uuid, version, change)
            .await;

        if !failures.is_empty() {
            let rollback_failures = self.rollback(receiver, prepared, change_uuid).await;
            if uncertain || !rollback_failures.is_empty() {
                let phase = if rollback_failures.is_empty() {
                    ChangePhase::Prepare
                } else {
                    ChangePhase::Rollback
                };
                return ChangeOutcome::MayNeedRecovery {
                    change_uuid,
                    phase,
                    failures: failures.into_iter().chain(rollback_failures).collect(),
                };
            }
            return ChangeOutcome::Rejected {
                change_uuid,
                rejections: failures,
            };
        }

        let commit_failures = self.commit(receiver, prepared, change_uuid).await;
        if !commit_failures.is_empty() {
            warn!(
                "Change {} is only partially committed; run a repair",
                change_uuid
            );
            return ChangeOutcome::MayNeedRecovery {
                change_uuid,
                phase: ChangePhase::Commit,
                failures: commit_failures,
            };
        }

        info!("Change {} committed on every node", change_uuid);
        ChangeOutcome::Applied {
            change_uuid,
            version,
        }
    }

    /// Prepare on every target.
    ///
    /// Returns the nodes that accepted (with their next count), the failures,
    /// and whether any failure leaves the node's state unknown.
    async fn prepare<R>(
        &self,
        receiver: &R,
        targets: Vec<Target<C>>,
        change_uuid: Uuid,
        version: u64,
        change: C,
    ) -> (Vec<Target<C>>, Vec<ServerFailure>, bool)
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        receiver.start_prepare(change_uuid);

        let host = self.client.host.clone();
        let user = self.client.user.clone();
        let timestamp = Utc::now();
        let endpoints: Vec<_> = targets.iter().map(|(e, count)| (e.clone(), *count)).collect();

        let results = fan_out(&self.client.config, "prepare", targets, |endpoint, count| {
            let message = MutativeMessage::prepare(
                count,
                host.clone(),
                user.clone(),
                timestamp,
                change_uuid,
                version,
                change.clone(),
            );
            async move { endpoint.send(message).await }
        })
        .await;

        let mut prepared = Vec::new();
        let mut failures = Vec::new();
        let mut uncertain = false;

        for ((endpoint, count), (node, result)) in endpoints.into_iter().zip(results) {
            match result {
                Ok(AcceptRejectResponse::Accept) => {
                    receiver.prepared(&node);
                    prepared.push((endpoint, count + 1));
                }
                Ok(AcceptRejectResponse::Reject {
                    reason,
                    message,
                    last_mutation_host,
                    last_mutation_user,
                }) => {
                    match reason {
                        RejectionReason::Dead => receiver.prepare_other_client(
                            &node,
                            last_mutation_host.as_deref(),
                            last_mutation_user.as_deref(),
                        ),
                        RejectionReason::Unacceptable => {
                            receiver.prepare_change_unacceptable(&node, &message)
                        }
                        RejectionReason::Bad => receiver.prepare_fail(&node, &message),
                    }
                    failures.push(ServerFailure {
                        node,
                        reason: format!("{reason}: {message}"),
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    receiver.prepare_fail(&node, &reason);
                    failures.push(ServerFailure { node, reason });
                    uncertain = true;
                }
            }
        }

        receiver.end_prepare();
        (prepared, failures, uncertain)
    }

    async fn commit<R>(
        &self,
        receiver: &R,
        targets: Vec<Target<C>>,
        change_uuid: Uuid,
    ) -> Vec<ServerFailure>
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        receiver.start_commit();
        let failures = send_final(self.client, targets, change_uuid, Decision::Commit)
            .await
            .into_iter()
            .filter_map(|(node, failure)| match failure {
                None => {
                    receiver.committed(&node);
                    None
                }
                Some(reason) => {
                    receiver.commit_fail(&node, &reason);
                    Some(ServerFailure { node, reason })
                }
            })
            .collect();
        receiver.end_commit();
        failures
    }

    async fn rollback<R>(
        &self,
        receiver: &R,
        targets: Vec<Target<C>>,
        change_uuid: Uuid,
    ) -> Vec<ServerFailure>
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        if targets.is_empty() {
            return Vec::new();
        }

        receiver.start_rollback();
        let failures = send_final(self.client, targets, change_uuid, Decision::Rollback)
            .await
            .into_iter()
            .filter_map(|(node, failure)| match failure {
                None => {
                    receiver.rolled_back(&node);
                    None
                }
                Some(reason) => {
                    receiver.rollback_fail(&node, &reason);
                    Some(ServerFailure { node, reason })
                }
            })
            .collect();
        receiver.end_rollback();
        failures
    }
}

/// Final decision for a prepared change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Commit,
    Rollback,
}

/// Send commit or rollback of `change_uuid` to each target at its count.
///
/// Yields `None` for nodes that accepted and the failure reason otherwise.
pub(crate) async fn send_final<C: NomadChange>(
    client: &NomadClient<C>,
    targets: Vec<Target<C>>,
    change_uuid: Uuid,
    decision: Decision,
) -> Vec<(NodeAddress, Option<String>)> {
    let targets = targets
        .into_iter()
        .map(|(endpoint, count)| (endpoint, (count, change_uuid)))
        .collect();
    send_final_each(client, targets, decision).await
}

/// Like [`send_final`], with a change identifier per target
pub(crate) async fn send_final_each<C: NomadChange>(
    client: &NomadClient<C>,
    targets: Vec<(Arc<dyn NomadEndpoint<C>>, (u64, Uuid))>,
    decision: Decision,
) -> Vec<(NodeAddress, Option<String>)> {
    let host = client.host.clone();
    let user = client.user.clone();
    let timestamp = Utc::now();
    let operation = match decision {
        Decision::Commit => "commit",
        Decision::Rollback => "rollback",
    };

    fan_out(&client.config, operation, targets, |endpoint, (count, uuid)| {
        let message = match decision {
            Decision::Commit => {
                MutativeMessage::commit(count, host.clone(), user.clone(), timestamp, uuid)
            }
            Decision::Rollback => {
                MutativeMessage::rollback(count, host.clone(), user.clone(), timestamp, uuid)
            }
        };
        async move { endpoint.send(message).await }
    })
    .await
    .into_iter()
    .map(|(node, result)| {
        let failure = match result {
            Ok(AcceptRejectResponse::Accept) => None,
            Ok(AcceptRejectResponse::Reject {
                reason, message, ..
            }) => Some(format!("{reason}: {message}")),
            Err(e) => Some(e.to_string()),
        };
        (node, failure)
    })
    .collect()
}
