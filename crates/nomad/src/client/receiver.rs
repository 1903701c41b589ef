//! Observers of client-side protocol runs
//!
//! Every callback has a no-op default so implementations only override what
//! they report. [`LoggingResultsReceiver`] traces everything.

use tracing::{info, warn};
use uuid::Uuid;

use crate::change::NomadChange;
use crate::messages::DiscoverResponse;

use super::change::ChangeOutcome;
use super::endpoint::NodeAddress;
use super::recovery::RecoveryOutcome;

/// Notified of discovery progress
pub trait DiscoverResultsReceiver<C>: Send + Sync {
    /// Discovery starts on these nodes
    fn start_discovery(&self, _nodes: &[NodeAddress]) {}

    /// A node answered
    fn discovered(&self, _node: &NodeAddress, _response: &DiscoverResponse<C>) {}

    /// A node could not be discovered
    fn discover_fail(&self, _node: &NodeAddress, _reason: &str) {}

    /// A node has a prepared change waiting
    fn discover_already_prepared(
        &self,
        _node: &NodeAddress,
        _change_uuid: Uuid,
        _creation_host: &str,
        _creation_user: &str,
    ) {
    }

    /// Nodes disagree on the final state of a change
    fn discover_cluster_inconsistent(
        &self,
        _change_uuid: Uuid,
        _committed_nodes: &[NodeAddress],
        _rolled_back_nodes: &[NodeAddress],
    ) {
    }

    /// A node was mutated by another client during discovery
    fn discover_other_client(
        &self,
        _node: &NodeAddress,
        _last_mutation_host: Option<&str>,
        _last_mutation_user: Option<&str>,
    ) {
    }

    /// Discovery is over
    fn end_discovery(&self) {}
}

/// Notified of commit and rollback phases
pub trait CommitRollbackResultsReceiver: Send + Sync {
    /// Commit starts
    fn start_commit(&self) {}

    /// A node committed
    fn committed(&self, _node: &NodeAddress) {}

    /// A node did not commit
    fn commit_fail(&self, _node: &NodeAddress, _reason: &str) {}

    /// Commit is over
    fn end_commit(&self) {}

    /// Rollback starts
    fn start_rollback(&self) {}

    /// A node rolled back
    fn rolled_back(&self, _node: &NodeAddress) {}

    /// A node did not roll back
    fn rollback_fail(&self, _node: &NodeAddress, _reason: &str) {}

    /// Rollback is over
    fn end_rollback(&self) {}
}

/// Notified of a change run
pub trait ChangeResultsReceiver<C>: DiscoverResultsReceiver<C> + CommitRollbackResultsReceiver {
    /// Prepare starts for a new change
    fn start_prepare(&self, _change_uuid: Uuid) {}

    /// A node prepared the change
    fn prepared(&self, _node: &NodeAddress) {}

    /// A node failed to prepare the change
    fn prepare_fail(&self, _node: &NodeAddress, _reason: &str) {}

    /// A node refused the change itself
    fn prepare_change_unacceptable(&self, _node: &NodeAddress, _reason: &str) {}

    /// A node was mutated by another client before prepare
    fn prepare_other_client(
        &self,
        _node: &NodeAddress,
        _last_mutation_host: Option<&str>,
        _last_mutation_user: Option<&str>,
    ) {
    }

    /// Prepare is over
    fn end_prepare(&self) {}

    /// The run finished
    fn change_done(&self, _outcome: &ChangeOutcome) {}
}

/// Notified of a recovery run
pub trait RecoveryResultsReceiver<C>: DiscoverResultsReceiver<C> + CommitRollbackResultsReceiver {
    /// Takeover starts
    fn start_takeover(&self) {}

    /// A node was taken over
    fn taken_over(&self, _node: &NodeAddress) {}

    /// A node could not be taken over
    fn takeover_fail(&self, _node: &NodeAddress, _reason: &str) {}

    /// Takeover is over
    fn end_takeover(&self) {}

    /// The run finished
    fn recovery_done(&self, _outcome: &RecoveryOutcome) {}
}

/// Receiver tracing every event
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingResultsReceiver;

impl<C: NomadChange> DiscoverResultsReceiver<C> for LoggingResultsReceiver {
    fn start_discovery(&self, nodes: &[NodeAddress]) {
        info!("Discovering {} nodes", nodes.len());
    }

    fn discovered(&self, node: &NodeAddress, response: &DiscoverResponse<C>) {
        info!(
            "Discovered {}: mode {}, count {}, version {}",
            node, response.mode, response.mutative_message_count, response.current_version
        );
    }

    fn discover_fail(&self, node: &NodeAddress, reason: &str) {
        warn!("Discovery failed on {}: {}", node, reason);
    }

    fn discover_already_prepared(
        &self,
        node: &NodeAddress,
        change_uuid: Uuid,
        creation_host: &str,
        creation_user: &str,
    ) {
        warn!(
            "{} already has change {} prepared by {}@{}",
            node, change_uuid, creation_user, creation_host
        );
    }

    fn discover_cluster_inconsistent(
        &self,
        change_uuid: Uuid,
        committed_nodes: &[NodeAddress],
        rolled_back_nodes: &[NodeAddress],
    ) {
        warn!(
            "Change {} is committed on {:?} but rolled back on {:?}",
            change_uuid, committed_nodes, rolled_back_nodes
        );
    }

    fn discover_other_client(
        &self,
        node: &NodeAddress,
        last_mutation_host: Option<&str>,
        last_mutation_user: Option<&str>,
    ) {
        warn!(
            "{} is being mutated by another client ({}@{})",
            node,
            last_mutation_user.unwrap_or("?"),
            last_mutation_host.unwrap_or("?")
        );
    }
}

impl CommitRollbackResultsReceiver for LoggingResultsReceiver {
    fn committed(&self, node: &NodeAddress) {
        info!("Committed on {}", node);
    }

    fn commit_fail(&self, node: &NodeAddress, reason: &str) {
        warn!("Commit failed on {}: {}", node, reason);
    }

    fn rolled_back(&self, node: &NodeAddress) {
        info!("Rolled back on {}", node);
    }

    fn rollback_fail(&self, node: &NodeAddress, reason: &str) {
        warn!("Rollback failed on {}: {}", node, reason);
    }
}

impl<C: NomadChange> ChangeResultsReceiver<C> for LoggingResultsReceiver {
    fn start_prepare(&self, change_uuid: Uuid) {
        info!("Preparing change {}", change_uuid);
    }

    fn prepared(&self, node: &NodeAddress) {
        info!("Prepared on {}", node);
    }

    fn prepare_fail(&self, node: &NodeAddress, reason: &str) {
        warn!("Prepare failed on {}: {}", node, reason);
    }

    fn prepare_change_unacceptable(&self, node: &NodeAddress, reason: &str) {
        warn!("Change refused by {}: {}", node, reason);
    }

    fn prepare_other_client(
        &self,
        node: &NodeAddress,
        last_mutation_host: Option<&str>,
        last_mutation_user: Option<&str>,
    ) {
        warn!(
            "Prepare on {} lost to another client ({}@{})",
            node,
            last_mutation_user.unwrap_or("?"),
            last_mutation_host.unwrap_or("?")
        );
    }

    fn change_done(&self, outcome: &ChangeOutcome) {
        info!("Change finished: {}", outcome);
    }
}

impl<C: NomadChange> RecoveryResultsReceiver<C> for LoggingResultsReceiver {
    fn taken_over(&self, node: &NodeAddress) {
        info!("Took over {}", node);
    }

    fn takeover_fail(&self, node: &NodeAddress, reason: &str) {
        warn!("Takeover failed on {}: {}", node, reason);
    }

    fn recovery_done(&self, outcome: &RecoveryOutcome) {
        info!("Recovery finished: {}", outcome);
    }
}

