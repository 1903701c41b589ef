//! A node's view of the configuration

use dynconf_model::{Cluster, Node, Stripe};
use serde::{Deserialize, Serialize};

/// The committed cluster configuration, seen from one node.
///
/// A node is identified by its name, which cannot change once the cluster
/// is activated. A node replaying the history of the stripe it joined is
/// not part of the earliest configurations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeContext {
    /// The whole cluster
    pub cluster: Cluster,
    /// Which node of the cluster this is
    pub node_name: String,
}

impl NodeContext {
    /// The view of `cluster` from the node called `node_name`
    pub fn new(cluster: Cluster, node_name: impl Into<String>) -> Self {
        Self {
            cluster,
            node_name: node_name.into(),
        }
    }

    /// This node, if it is part of the cluster
    pub fn node(&self) -> Option<&Node> {
        self.cluster.find_node(&self.node_name)
    }

    /// The stripe of this node
    pub fn stripe(&self) -> Option<&Stripe> {
        let node = self.node()?;
        self.cluster.stripe_of(&node.uid)
    }
}
