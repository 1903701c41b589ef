//! Classification of cluster-wide consistency from discovery results
//!
//! [`ConsistencyAnalyzer`] is a plain accumulator: discovery feeds it one
//! event at a time and [`ConsistencyAnalyzer::global_state`] is a pure
//! function of what was accumulated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::{ChangeRequestState, NomadChangeInfo};
use crate::messages::{DiscoverResponse, NomadServerMode};

use super::endpoint::NodeAddress;

/// Consistency of the whole cluster, as seen by one discovery
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalState {
    /// Every node accepts new changes
    Accepting,
    /// Every node is prepared for the same change
    Prepared,

    /// Nodes hold different final states for the same change
    Inconsistent,
    /// Another client mutated a node during discovery
    ConcurrentAccess,
    /// At least one node could not be discovered
    DiscoveryFailure,

    /// Some nodes are prepared and the latest changes differ
    PartiallyPrepared,
    /// Every node is prepared or committed for the same change
    PartiallyCommitted,
    /// Every node is prepared or rolled back for the same change
    PartiallyRolledBack,
    /// Every node answered but no classification applies
    Unknown,

    /// Like `PartiallyCommitted`, with unreachable nodes
    MaybePartiallyCommitted,
    /// Like `PartiallyRolledBack`, with unreachable nodes
    MaybePartiallyRolledBack,
    /// Like `Prepared`, with unreachable nodes
    MaybePrepared,
    /// Like `Unknown`, with unreachable nodes
    MaybeUnknown,
}

impl GlobalState {
    /// Whether the state depends on nodes that did not answer
    pub fn is_uncertain(self) -> bool {
        matches!(
            self,
            Self::MaybePartiallyCommitted
                | Self::MaybePartiallyRolledBack
                | Self::MaybePrepared
                | Self::MaybeUnknown
        )
    }

    /// One-line explanation for operators
    pub fn description(self) -> &'static str {
        match self {
            Self::Accepting => "the cluster accepts new changes",
            Self::Prepared => "every node has the same change prepared",
            Self::Inconsistent => "nodes disagree on the outcome of a change",
            Self::ConcurrentAccess => "another client is changing the configuration",
            Self::DiscoveryFailure => "some nodes could not be reached",
            Self::PartiallyPrepared => "a change is prepared on some nodes only",
            Self::PartiallyCommitted => "a change is committed on some nodes only",
            Self::PartiallyRolledBack => "a change is rolled back on some nodes only",
            Self::Unknown => "the cluster state cannot be determined",
            Self::MaybePartiallyCommitted => {
                "a change may be committed on some nodes only; some nodes are unreachable"
            }
            Self::MaybePartiallyRolledBack => {
                "a change may be rolled back on some nodes only; some nodes are unreachable"
            }
            Self::MaybePrepared => {
                "reachable nodes have the same change prepared; some nodes are unreachable"
            }
            Self::MaybeUnknown => {
                "the cluster state cannot be determined; some nodes are unreachable"
            }
        }
    }
}

impl Display for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepting => "ACCEPTING",
            Self::Prepared => "PREPARED",
            Self::Inconsistent => "INCONSISTENT",
            Self::ConcurrentAccess => "CONCURRENT_ACCESS",
            Self::DiscoveryFailure => "DISCOVERY_FAILURE",
            Self::PartiallyPrepared => "PARTIALLY_PREPARED",
            Self::PartiallyCommitted => "PARTIALLY_COMMITTED",
            Self::PartiallyRolledBack => "PARTIALLY_ROLLED_BACK",
            Self::Unknown => "UNKNOWN",
            Self::MaybePartiallyCommitted => "MAYBE_PARTIALLY_COMMITTED",
            Self::MaybePartiallyRolledBack => "MAYBE_PARTIALLY_ROLLED_BACK",
            Self::MaybePrepared => "MAYBE_PREPARED",
            Self::MaybeUnknown => "MAYBE_UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// Nodes disagreeing on the final state of one change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInconsistency {
    /// The disputed change
    pub change_uuid: Uuid,
    /// Nodes that committed it
    pub committed_nodes: Vec<NodeAddress>,
    /// Nodes that rolled it back
    pub rolled_back_nodes: Vec<NodeAddress>,
}

/// A node mutated by someone else while discovery ran
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtherClient {
    /// The node
    pub node: NodeAddress,
    /// Host of the other client, if known
    pub host: Option<String>,
    /// User of the other client, if known
    pub user: Option<String>,
}

/// Counts over the latest change of every responding node
#[derive(Debug, Default)]
struct Tally {
    uuids: usize,
    prepared: usize,
    committed: usize,
    rolled_back: usize,
}

/// Accumulates discovery results and classifies the cluster
#[derive(Clone, Debug)]
pub struct ConsistencyAnalyzer<C> {
    node_count: usize,
    responses: BTreeMap<NodeAddress, DiscoverResponse<C>>,
    discover_failure: Option<(NodeAddress, String)>,
    inconsistency: Option<ClusterInconsistency>,
    other_client: Option<OtherClient>,
}

impl<C: Clone> ConsistencyAnalyzer<C> {
    /// Analyzer for a cluster of `node_count` nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            responses: BTreeMap::new(),
            discover_failure: None,
            inconsistency: None,
            other_client: None,
        }
    }

    /// Record a node's discovery response
    pub fn discovered(&mut self, node: NodeAddress, response: DiscoverResponse<C>) {
        self.responses.insert(node, response);
    }

    /// Record a node that could not be discovered
    pub fn discover_fail(&mut self, node: NodeAddress, reason: impl Into<String>) {
        self.discover_failure = Some((node, reason.into()));
    }

    /// Record nodes disagreeing on the final state of a change
    pub fn discover_cluster_inconsistent(
        &mut self,
        change_uuid: Uuid,
        committed_nodes: Vec<NodeAddress>,
        rolled_back_nodes: Vec<NodeAddress>,
    ) {
        self.inconsistency = Some(ClusterInconsistency {
            change_uuid,
            committed_nodes,
            rolled_back_nodes,
        });
    }

    /// Record a node mutated by another client during discovery
    pub fn discover_other_client(
        &mut self,
        node: NodeAddress,
        host: Option<String>,
        user: Option<String>,
    ) {
        self.other_client = Some(OtherClient { node, host, user });
    }

    /// Number of nodes in the cluster
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Every response received, keyed by node
    pub fn responses(&self) -> &BTreeMap<NodeAddress, DiscoverResponse<C>> {
        &self.responses
    }

    /// The response of one node, if it answered
    pub fn discovery_response(&self, node: &NodeAddress) -> Option<&DiscoverResponse<C>> {
        self.responses.get(node)
    }

    /// The last recorded discovery failure
    pub fn discover_failure(&self) -> Option<(&NodeAddress, &str)> {
        self.discover_failure
            .as_ref()
            .map(|(node, reason)| (node, reason.as_str()))
    }

    /// The recorded inconsistency, if any
    pub fn inconsistency(&self) -> Option<&ClusterInconsistency> {
        self.inconsistency.as_ref()
    }

    /// The recorded concurrent client, if any
    pub fn other_client(&self) -> Option<&OtherClient> {
        self.other_client.as_ref()
    }

    /// Whether fewer nodes answered than the cluster holds
    pub fn has_unreachable_nodes(&self) -> bool {
        self.node_count > self.responses.len()
    }

    /// The most recent checkpoint present on every responding node
    pub fn checkpoint(&self) -> Option<&NomadChangeInfo<C>> {
        let mut by_uuid: HashMap<Uuid, Vec<&NomadChangeInfo<C>>> = HashMap::new();
        for checkpoint in self.responses.values().flat_map(|r| &r.checkpoints) {
            by_uuid
                .entry(checkpoint.change_uuid)
                .or_default()
                .push(checkpoint);
        }

        by_uuid
            .into_values()
            .filter(|copies| copies.len() == self.responses.len())
            .filter_map(|copies| copies.first().copied())
            .max_by_key(|checkpoint| checkpoint.version)
    }

    /// Classify the cluster; the first matching rule wins
    pub fn global_state(&self) -> GlobalState {
        if self.discover_failure.is_some() {
            return GlobalState::DiscoveryFailure;
        }
        if self.inconsistency.is_some() {
            return GlobalState::Inconsistent;
        }
        if self.other_client.is_some() {
            return GlobalState::ConcurrentAccess;
        }
        if self
            .responses
            .values()
            .all(|r| r.mode == NomadServerMode::Accepting)
        {
            return GlobalState::Accepting;
        }

        let n = self.node_count;
        let tally = self.tally();
        match tally {
            Tally {
                uuids: 1,
                rolled_back: 0,
                committed: 0,
                prepared,
            } if prepared > 0 && prepared >= n => GlobalState::Prepared,
            Tally {
                uuids: 1,
                rolled_back: 0,
                committed: 0,
                prepared,
            } if prepared > 0 => GlobalState::MaybePrepared,
            Tally {
                uuids, prepared, ..
            } if uuids > 1 && prepared > 0 => GlobalState::PartiallyPrepared,
            Tally {
                uuids: 1,
                rolled_back: 0,
                committed,
                prepared,
            } if committed > 0 && prepared > 0 && prepared + committed >= n => {
                GlobalState::PartiallyCommitted
            }
            Tally {
                uuids: 1,
                rolled_back: 0,
                committed,
                prepared,
            } if committed > 0 && prepared > 0 => GlobalState::MaybePartiallyCommitted,
            Tally {
                uuids: 1,
                rolled_back,
                committed: 0,
                prepared,
            } if rolled_back > 0 && prepared > 0 && prepared + rolled_back >= n => {
                GlobalState::PartiallyRolledBack
            }
            Tally {
                uuids: 1,
                rolled_back,
                committed: 0,
                prepared,
            } if rolled_back > 0 && prepared > 0 => GlobalState::MaybePartiallyRolledBack,
            _ if self.responses.len() >= n => GlobalState::Unknown,
            _ => GlobalState::MaybeUnknown,
        }
    }

    fn tally(&self) -> Tally {
        // A node without any change counts as its own distinct latest change
        let uuids: HashSet<Option<Uuid>> = self
            .responses
            .values()
            .map(|r| r.latest_change.as_ref().map(|c| c.change_uuid))
            .collect();

        let mut tally = Tally {
            uuids: uuids.len(),
            ..Tally::default()
        };
        for latest in self.responses.values().filter_map(|r| r.latest_change.as_ref()) {
            match latest.change_request_state {
                ChangeRequestState::Prepared => tally.prepared += 1,
                ChangeRequestState::Committed => tally.committed += 1,
                ChangeRequestState::RolledBack => tally.rolled_back += 1,
            }
        }
        tally
    }
}
