//! Cluster topology: a cluster of stripes of nodes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::lock::LockContext;
use crate::uid::Uid;

/// A server process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable identifier
    pub uid: Uid,
    /// Name, unique in the cluster
    pub name: String,
    /// Hostname the node binds to
    pub hostname: String,
    /// Port the node listens on
    pub port: u16,
    /// Node-scoped settings, keyed by `key` or `key.name`
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl Node {
    /// Create a node with a fresh UID
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            uid: Uid::new(),
            name: name.into(),
            hostname: hostname.into(),
            port,
            settings: BTreeMap::new(),
        }
    }

    /// `hostname:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// A replica set of nodes sharing one data partition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stripe {
    /// Stable identifier
    pub uid: Uid,
    /// Name, unique in the cluster
    pub name: String,
    /// Members
    pub nodes: Vec<Node>,
}

impl Stripe {
    /// Create a stripe with a fresh UID
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            uid: Uid::new(),
            name: name.into(),
            nodes,
        }
    }

    /// Find a member by name
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }
}

/// The whole cluster topology and its cluster-scoped settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Stable identifier
    pub uid: Uid,
    /// Name of the cluster
    pub name: String,
    /// Stripes, in creation order
    pub stripes: Vec<Stripe>,
    /// Cluster-scoped settings, keyed by `key` or `key.name`
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Current configuration lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_context: Option<LockContext>,
}

impl Cluster {
    /// Create a cluster with a fresh UID
    pub fn new(name: impl Into<String>, stripes: Vec<Stripe>) -> Self {
        Self {
            uid: Uid::new(),
            name: name.into(),
            stripes,
            settings: BTreeMap::new(),
            lock_context: None,
        }
    }

    /// Every node of every stripe
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.stripes.iter().flat_map(|stripe| stripe.nodes.iter())
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Find a node by name
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|node| node.name == name)
    }

    /// Find a node by UID
    pub fn node(&self, uid: &Uid) -> Option<&Node> {
        self.nodes().find(|node| node.uid == *uid)
    }

    /// Find a stripe by UID
    pub fn stripe(&self, uid: &Uid) -> Option<&Stripe> {
        self.stripes.iter().find(|stripe| stripe.uid == *uid)
    }

    /// The stripe a node belongs to
    pub fn stripe_of(&self, node_uid: &Uid) -> Option<&Stripe> {
        self.stripes
            .iter()
            .find(|stripe| stripe.nodes.iter().any(|node| node.uid == *node_uid))
    }

    /// Whether a lock is held on the configuration
    pub fn is_locked(&self) -> bool {
        self.lock_context.is_some()
    }

    /// Mutable access to every node
    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.stripes
            .iter_mut()
            .flat_map(|stripe| stripe.nodes.iter_mut())
    }

    pub(crate) fn stripe_mut(&mut self, uid: &Uid) -> Option<&mut Stripe> {
        self.stripes.iter_mut().find(|stripe| stripe.uid == *uid)
    }

    /// Check structural rules: at least one stripe, no empty stripe, unique
    /// stripe names, node names and node addresses
    pub fn validate(&self) -> ModelResult<()> {
        if self.stripes.is_empty() {
            return Err(ModelError::Conflict(format!(
                "Cluster '{}' has no stripe",
                self.name
            )));
        }

        let mut stripe_names = Vec::new();
        let mut node_names = Vec::new();
        let mut addresses = Vec::new();
        for stripe in &self.stripes {
            if stripe.nodes.is_empty() {
                return Err(ModelError::Conflict(format!(
                    "Stripe '{}' has no node",
                    stripe.name
                )));
            }
            if stripe_names.contains(&stripe.name) {
                return Err(ModelError::Conflict(format!(
                    "Duplicate stripe name '{}'",
                    stripe.name
                )));
            }
            stripe_names.push(stripe.name.clone());

            for node in &stripe.nodes {
                if node_names.contains(&node.name) {
                    return Err(ModelError::Conflict(format!(
                        "Duplicate node name '{}'",
                        node.name
                    )));
                }
                let address = node.address();
                if addresses.contains(&address) {
                    return Err(ModelError::Conflict(format!(
                        "Duplicate node address {address}"
                    )));
                }
                node_names.push(node.name.clone());
                addresses.push(address);
            }
        }
        Ok(())
    }

    /// This cluster with `node` added to a stripe
    pub fn with_node_added(&self, stripe_uid: &Uid, node: Node) -> ModelResult<Cluster> {
        let mut cluster = self.clone();
        let stripe = cluster
            .stripe_mut(stripe_uid)
            .ok_or_else(|| ModelError::NotFound(format!("stripe {stripe_uid}")))?;
        stripe.nodes.push(node);
        cluster.validate()?;
        Ok(cluster)
    }

    /// This cluster without a node
    pub fn with_node_removed(&self, node_uid: &Uid) -> ModelResult<Cluster> {
        let mut cluster = self.clone();
        let stripe_uid = cluster
            .stripe_of(node_uid)
            .map(|stripe| stripe.uid)
            .ok_or_else(|| ModelError::NotFound(format!("node {node_uid}")))?;
        if let Some(stripe) = cluster.stripe_mut(&stripe_uid) {
            stripe.nodes.retain(|node| node.uid != *node_uid);
        }
        cluster.validate()?;
        Ok(cluster)
    }

    /// This cluster with one more stripe
    pub fn with_stripe_added(&self, stripe: Stripe) -> ModelResult<Cluster> {
        let mut cluster = self.clone();
        cluster.stripes.push(stripe);
        cluster.validate()?;
        Ok(cluster)
    }

    /// This cluster without a stripe
    pub fn with_stripe_removed(&self, stripe_uid: &Uid) -> ModelResult<Cluster> {
        if self.stripe(stripe_uid).is_none() {
            return Err(ModelError::NotFound(format!("stripe {stripe_uid}")));
        }
        let mut cluster = self.clone();
        cluster.stripes.retain(|stripe| stripe.uid != *stripe_uid);
        cluster.validate()?;
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_cluster() -> Cluster {
        Cluster::new(
            "demo",
            vec![Stripe::new(
                "stripe-1",
                vec![
                    Node::new("node-1", "localhost", 9410),
                    Node::new("node-2", "localhost", 9420),
                ],
            )],
        )
    }

    #[test]
    fn test_lookup() {
        let cluster = two_node_cluster();
        let node = cluster.find_node("node-2").unwrap();

        assert_eq!(cluster.node_count(), 2);
        assert_eq!(cluster.node(&node.uid).unwrap().name, "node-2");
        assert_eq!(cluster.stripe_of(&node.uid).unwrap().name, "stripe-1");
        assert_eq!(node.address(), "localhost:9420");
        assert!(cluster.find_node("node-3").is_none());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut cluster = two_node_cluster();
        assert!(cluster.validate().is_ok());

        cluster.stripes[0].nodes[1].name = "node-1".to_string();
        assert!(matches!(cluster.validate(), Err(ModelError::Conflict(_))));

        let mut cluster = two_node_cluster();
        cluster.stripes[0].nodes[1].port = 9410;
        assert!(matches!(cluster.validate(), Err(ModelError::Conflict(_))));
    }

    #[test]
    fn test_add_and_remove_nodes() {
        let cluster = two_node_cluster();
        let stripe_uid = cluster.stripes[0].uid;

        let bigger = cluster
            .with_node_added(&stripe_uid, Node::new("node-3", "localhost", 9430))
            .unwrap();
        assert_eq!(bigger.node_count(), 3);
        assert_eq!(cluster.node_count(), 2);

        let node_uid = bigger.find_node("node-1").unwrap().uid;
        let smaller = bigger.with_node_removed(&node_uid).unwrap();
        assert_eq!(smaller.node_count(), 2);
        assert!(smaller.find_node("node-1").is_none());

        assert!(matches!(
            cluster.with_node_added(&Uid::new(), Node::new("x", "h", 1)),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn test_last_stripe_cannot_be_removed() {
        let cluster = two_node_cluster();
        let stripe_uid = cluster.stripes[0].uid;

        assert!(matches!(
            cluster.with_stripe_removed(&stripe_uid),
            Err(ModelError::Conflict(_))
        ));

        let bigger = cluster
            .with_stripe_added(Stripe::new(
                "stripe-2",
                vec![Node::new("node-3", "localhost", 9430)],
            ))
            .unwrap();
        let back = bigger.with_stripe_removed(&bigger.stripes[1].uid).unwrap();
        assert_eq!(back, cluster);
    }

    #[test]
    fn test_equality_includes_uids() {
        let a = two_node_cluster();
        let mut b = a.clone();
        assert_eq!(a, b);

        b.stripes[0].nodes[0].uid = Uid::new();
        assert_ne!(a, b);
    }
}
