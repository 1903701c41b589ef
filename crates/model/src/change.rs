//! Configuration changes carried by the Nomad protocol
//!
//! Every change knows how to transform the committed [`Cluster`] into the
//! next one. Topology changes also record the cluster they produce, which
//! lets a joining node compare topologies without replaying anything.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use dynconf_nomad::NomadChange;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::lock::LockContext;
use crate::setting::{Applicability, Setting, SettingScope};
use crate::topology::{Cluster, Node, Stripe};
use crate::uid::Uid;

/// Whether a setting change assigns or removes a value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingOperation {
    /// Assign a value
    Set,
    /// Remove the value
    Unset,
}

impl Display for SettingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Unset => write!(f, "unset"),
        }
    }
}

/// Assignment or removal of one setting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingChange {
    /// Set or unset
    pub operation: SettingOperation,
    /// Which part of the topology is targeted
    pub applicability: Applicability,
    /// The setting
    pub setting: Setting,
    /// Entry name, for map settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New value, for `set`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SettingChange {
    /// Assign `value` to a setting (or to its `name` entry for map settings)
    pub fn set(
        applicability: Applicability,
        setting: Setting,
        name: Option<&str>,
        value: impl Into<String>,
    ) -> ModelResult<Self> {
        if setting.is_map() != name.is_some() {
            return Err(ModelError::InvalidSetting(if setting.is_map() {
                format!("{setting} requires an entry name: {setting}.<name>=<value>")
            } else {
                format!("{setting} does not take an entry name")
            }));
        }

        Ok(Self {
            operation: SettingOperation::Set,
            applicability,
            setting,
            name: name.map(str::to_string),
            value: Some(value.into()),
        })
    }

    /// Remove a setting, one of its entries, or all its entries when no
    /// name is given for a map setting
    pub fn unset(
        applicability: Applicability,
        setting: Setting,
        name: Option<&str>,
    ) -> ModelResult<Self> {
        if !setting.allows_unset() {
            return Err(ModelError::InvalidSetting(format!(
                "{setting} cannot be unset"
            )));
        }
        if name.is_some() && !setting.is_map() {
            return Err(ModelError::InvalidSetting(format!(
                "{setting} does not take an entry name"
            )));
        }

        Ok(Self {
            operation: SettingOperation::Unset,
            applicability,
            setting,
            name: name.map(str::to_string),
            value: None,
        })
    }

    /// Parse `key[.name]=value` (set) or `key[.name]` (unset)
    pub fn parse(
        applicability: Applicability,
        operation: SettingOperation,
        expression: &str,
    ) -> ModelResult<Self> {
        let (target, value) = match (operation, expression.split_once('=')) {
            (SettingOperation::Set, Some((target, value))) => (target, Some(value)),
            (SettingOperation::Unset, None) => (expression, None),
            (SettingOperation::Set, None) => {
                return Err(ModelError::InvalidSetting(format!(
                    "expected <setting>=<value> but got '{expression}'"
                )));
            }
            (SettingOperation::Unset, Some(_)) => {
                return Err(ModelError::InvalidSetting(format!(
                    "unset does not take a value: '{expression}'"
                )));
            }
        };

        let (key, name) = match target.split_once('.') {
            Some((key, name)) => (key, Some(name)),
            None => (target, None),
        };
        let setting: Setting = key.parse()?;

        match value {
            Some(value) => Self::set(applicability, setting, name, value),
            None => Self::unset(applicability, setting, name),
        }
    }

    /// The stored key: `key` or `key.name`
    pub fn key(&self) -> String {
        match &self.name {
            Some(name) => format!("{}.{}", self.setting, name),
            None => self.setting.to_string(),
        }
    }

    /// Human readable description
    pub fn summary(&self) -> String {
        let target = match self.applicability {
            Applicability::Cluster => String::new(),
            other => format!(" on {other}"),
        };
        match (&self.operation, &self.value) {
            (SettingOperation::Set, Some(value)) => format!("set {}={}{}", self.key(), value, target),
            _ => format!("unset {}{}", self.key(), target),
        }
    }

    fn value(&self) -> ModelResult<&str> {
        self.value
            .as_deref()
            .ok_or_else(|| ModelError::InvalidSetting(format!("no value for {}", self.key())))
    }

    /// Apply to `cluster` in place
    pub fn apply(&self, cluster: &mut Cluster) -> ModelResult<()> {
        match self.setting.scope() {
            SettingScope::Cluster => {
                if self.applicability != Applicability::Cluster {
                    return Err(ModelError::InvalidSetting(format!(
                        "{} can only be changed at cluster level",
                        self.setting
                    )));
                }
                if self.setting == Setting::ClusterName {
                    cluster.name = self.value()?.to_string();
                    return Ok(());
                }
                apply_to_map(
                    &mut cluster.settings,
                    self.setting,
                    self.operation,
                    &self.key(),
                    self.value.clone(),
                );
                Ok(())
            }
            SettingScope::Node => {
                let targets = self.target_nodes(cluster)?;
                for node in cluster.nodes_mut() {
                    if targets.contains(&node.uid) {
                        self.apply_to_node(node)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn target_nodes(&self, cluster: &Cluster) -> ModelResult<Vec<Uid>> {
        match &self.applicability {
            Applicability::Cluster => Ok(cluster.nodes().map(|node| node.uid).collect()),
            Applicability::Stripe(uid) => cluster
                .stripe(uid)
                .map(|stripe| stripe.nodes.iter().map(|node| node.uid).collect())
                .ok_or_else(|| ModelError::NotFound(format!("stripe {uid}"))),
            Applicability::Node(uid) => cluster
                .node(uid)
                .map(|node| vec![node.uid])
                .ok_or_else(|| ModelError::NotFound(format!("node {uid}"))),
        }
    }

    fn apply_to_node(&self, node: &mut Node) -> ModelResult<()> {
        match self.setting {
            Setting::NodeName => node.name = self.value()?.to_string(),
            Setting::NodeHostname => node.hostname = self.value()?.to_string(),
            Setting::NodePort => {
                let value = self.value()?;
                node.port = value.parse().map_err(|_| {
                    ModelError::InvalidSetting(format!("invalid port '{value}'"))
                })?;
            }
            setting => apply_to_map(
                &mut node.settings,
                setting,
                self.operation,
                &self.key(),
                self.value.clone(),
            ),
        }
        Ok(())
    }
}

fn apply_to_map(
    settings: &mut BTreeMap<String, String>,
    setting: Setting,
    operation: SettingOperation,
    key: &str,
    value: Option<String>,
) {
    match (operation, value) {
        (SettingOperation::Set, Some(value)) => {
            settings.insert(key.to_string(), value);
        }
        _ if setting.is_map() && key == setting.key() => {
            let prefix = format!("{key}.");
            settings.retain(|k, _| !k.starts_with(&prefix));
        }
        _ => {
            settings.remove(key);
        }
    }
}

/// A change to the dynamic configuration of a cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DynamicConfigNomadChange {
    /// First change of every node: installs the topology
    ClusterActivation {
        /// The activated cluster
        cluster: Cluster,
    },
    /// A node joins a stripe
    #[serde(rename_all = "camelCase")]
    NodeAddition {
        /// Target stripe
        stripe_uid: Uid,
        /// The new node
        node: Node,
        /// Resulting topology
        cluster: Cluster,
    },
    /// A node leaves its stripe
    #[serde(rename_all = "camelCase")]
    NodeRemoval {
        /// Stripe the node leaves
        stripe_uid: Uid,
        /// The removed node
        node: Node,
        /// Resulting topology
        cluster: Cluster,
    },
    /// A stripe joins the cluster
    StripeAddition {
        /// The new stripe
        stripe: Stripe,
        /// Resulting topology
        cluster: Cluster,
    },
    /// A stripe leaves the cluster
    StripeRemoval {
        /// The removed stripe
        stripe: Stripe,
        /// Resulting topology
        cluster: Cluster,
    },
    /// Set or unset one setting
    Setting(SettingChange),
    /// Several setting changes applied together
    MultiSetting {
        /// The changes, applied in order
        changes: Vec<SettingChange>,
    },
    /// Take the configuration lock
    #[serde(rename_all = "camelCase")]
    LockConfig {
        /// The new holder
        lock_context: LockContext,
    },
    /// Release the configuration lock
    UnlockConfig {
        /// Release even without presenting the token
        forced: bool,
    },
    /// A change made by the lock holder
    #[serde(rename_all = "camelCase")]
    LockAware {
        /// Token of the lock holder
        lock_token: String,
        /// The wrapped change
        change: Box<DynamicConfigNomadChange>,
    },
}

impl DynamicConfigNomadChange {
    /// Activate `cluster`
    pub fn activation(cluster: Cluster) -> ModelResult<Self> {
        cluster.validate()?;
        Ok(Self::ClusterActivation { cluster })
    }

    /// Add `node` to a stripe of `original`
    pub fn node_addition(original: &Cluster, stripe_uid: Uid, node: Node) -> ModelResult<Self> {
        let cluster = original.with_node_added(&stripe_uid, node.clone())?;
        Ok(Self::NodeAddition {
            stripe_uid,
            node,
            cluster,
        })
    }

    /// Remove a node of `original`
    pub fn node_removal(original: &Cluster, node_uid: &Uid) -> ModelResult<Self> {
        let stripe = original
            .stripe_of(node_uid)
            .ok_or_else(|| ModelError::NotFound(format!("node {node_uid}")))?;
        let node = original
            .node(node_uid)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(format!("node {node_uid}")))?;
        Ok(Self::NodeRemoval {
            stripe_uid: stripe.uid,
            cluster: original.with_node_removed(node_uid)?,
            node,
        })
    }

    /// Add `stripe` to `original`
    pub fn stripe_addition(original: &Cluster, stripe: Stripe) -> ModelResult<Self> {
        let cluster = original.with_stripe_added(stripe.clone())?;
        Ok(Self::StripeAddition { stripe, cluster })
    }

    /// Remove a stripe of `original`
    pub fn stripe_removal(original: &Cluster, stripe_uid: &Uid) -> ModelResult<Self> {
        let stripe = original
            .stripe(stripe_uid)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(format!("stripe {stripe_uid}")))?;
        Ok(Self::StripeRemoval {
            cluster: original.with_stripe_removed(stripe_uid)?,
            stripe,
        })
    }

    /// Wrap this change as made by the holder of `lock_token`
    pub fn with_lock_token(self, lock_token: impl Into<String>) -> Self {
        Self::LockAware {
            lock_token: lock_token.into(),
            change: Box::new(self),
        }
    }

    /// The change without any lock-aware wrapping
    pub fn without_lock(&self) -> &DynamicConfigNomadChange {
        match self {
            Self::LockAware { change, .. } => change.without_lock(),
            other => other,
        }
    }

    /// The topology produced by a topology change
    pub fn topology(&self) -> Option<&Cluster> {
        match self.without_lock() {
            Self::ClusterActivation { cluster }
            | Self::NodeAddition { cluster, .. }
            | Self::NodeRemoval { cluster, .. }
            | Self::StripeAddition { cluster, .. }
            | Self::StripeRemoval { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    /// Whether this is a cluster activation
    pub fn is_activation(&self) -> bool {
        matches!(self.without_lock(), Self::ClusterActivation { .. })
    }

    /// Compute the cluster this change produces from the committed one
    /// (`None` before activation)
    pub fn apply(&self, original: Option<&Cluster>) -> ModelResult<Cluster> {
        if let Self::ClusterActivation { cluster } = self {
            if original.is_some() {
                return Err(ModelError::InvalidState(
                    "cluster is already activated".to_string(),
                ));
            }
            cluster.validate()?;
            return Ok(cluster.clone());
        }

        let original = original
            .ok_or_else(|| ModelError::InvalidState("cluster is not activated".to_string()))?;

        match self {
            Self::ClusterActivation { .. } => Err(ModelError::InvalidState(
                "cluster is already activated".to_string(),
            )),
            Self::NodeAddition {
                stripe_uid, node, ..
            } => original.with_node_added(stripe_uid, node.clone()),
            Self::NodeRemoval { node, .. } => original.with_node_removed(&node.uid),
            Self::StripeAddition { stripe, .. } => original.with_stripe_added(stripe.clone()),
            Self::StripeRemoval { stripe, .. } => original.with_stripe_removed(&stripe.uid),
            Self::Setting(change) => {
                let mut cluster = original.clone();
                change.apply(&mut cluster)?;
                cluster.validate()?;
                Ok(cluster)
            }
            Self::MultiSetting { changes } => {
                let mut cluster = original.clone();
                for change in changes {
                    change.apply(&mut cluster)?;
                }
                cluster.validate()?;
                Ok(cluster)
            }
            Self::LockConfig { lock_context } => {
                if let Some(existing) = &original.lock_context {
                    return Err(ModelError::Conflict(format!(
                        "config is already locked by '{existing}'"
                    )));
                }
                let mut cluster = original.clone();
                cluster.lock_context = Some(lock_context.clone());
                Ok(cluster)
            }
            Self::UnlockConfig { .. } => {
                let mut cluster = original.clone();
                cluster.lock_context = None;
                Ok(cluster)
            }
            Self::LockAware { change, .. } => change.apply(Some(original)),
        }
    }
}

impl NomadChange for DynamicConfigNomadChange {
    fn summary(&self) -> String {
        match self {
            Self::ClusterActivation { cluster } => {
                format!("Activating cluster '{}'", cluster.name)
            }
            Self::NodeAddition {
                stripe_uid,
                node,
                cluster,
            } => format!(
                "Attaching node: {} to stripe: {}",
                node.address(),
                stripe_name(cluster, stripe_uid)
            ),
            Self::NodeRemoval {
                stripe_uid, node, ..
            } => format!(
                "Detaching node: {} from stripe ID: {}",
                node.address(),
                stripe_uid
            ),
            Self::StripeAddition { stripe, cluster } => format!(
                "Attaching stripe: {} to cluster: {}",
                stripe_addresses(stripe),
                cluster.name
            ),
            Self::StripeRemoval { stripe, cluster } => format!(
                "Detaching stripe: {} from cluster: {}",
                stripe_addresses(stripe),
                cluster.name
            ),
            Self::Setting(change) => change.summary(),
            Self::MultiSetting { changes } => changes
                .iter()
                .map(SettingChange::summary)
                .collect::<Vec<_>>()
                .join(", "),
            Self::LockConfig { lock_context } => {
                format!("Locking the config by {lock_context}")
            }
            Self::UnlockConfig { forced: false } => "Unlocking the config".to_string(),
            Self::UnlockConfig { forced: true } => "Forcefully unlocking the config".to_string(),
            Self::LockAware { change, .. } => change.summary(),
        }
    }

    fn is_checkpoint(&self) -> bool {
        self.is_activation()
    }
}

fn stripe_name(cluster: &Cluster, stripe_uid: &Uid) -> String {
    cluster
        .stripe(stripe_uid)
        .map_or_else(|| stripe_uid.to_string(), |stripe| stripe.name.clone())
}

fn stripe_addresses(stripe: &Stripe) -> String {
    let addresses: Vec<String> = stripe.nodes.iter().map(Node::address).collect();
    format!("[{}]", addresses.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn cluster() -> Cluster {
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

    fn activated() -> Cluster {
        let change = DynamicConfigNomadChange::activation(cluster()).unwrap();
        change.apply(None).unwrap()
    }

    #[test]
    fn test_activation_happens_once() {
        let change = DynamicConfigNomadChange::activation(cluster()).unwrap();
        let activated = change.apply(None).unwrap();

        assert!(change.is_checkpoint());
        assert_eq!(change.topology(), Some(&activated));
        assert_matches!(
            change.apply(Some(&activated)),
            Err(ModelError::InvalidState(_))
        );
    }

    #[test]
    fn test_changes_need_an_activated_cluster() {
        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(
                Applicability::Cluster,
                Setting::OffheapResources,
                Some("main"),
                "512MB",
            )
            .unwrap(),
        );
        assert_matches!(change.apply(None), Err(ModelError::InvalidState(_)));
    }

    #[test]
    fn test_cluster_setting() {
        let original = activated();
        let change = DynamicConfigNomadChange::Setting(
            SettingChange::parse(
                Applicability::Cluster,
                SettingOperation::Set,
                "offheap-resources.main=512MB",
            )
            .unwrap(),
        );

        let cluster = change.apply(Some(&original)).unwrap();
        assert_eq!(cluster.settings["offheap-resources.main"], "512MB");
        assert_eq!(change.summary(), "set offheap-resources.main=512MB");
        assert!(!change.is_checkpoint());
        assert!(change.topology().is_none());
    }

    #[test]
    fn test_cluster_setting_refuses_node_target() {
        let original = activated();
        let node_uid = original.find_node("node-1").unwrap().uid;
        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(
                Applicability::Node(node_uid),
                Setting::ClientReconnectWindow,
                None,
                "120s",
            )
            .unwrap(),
        );

        assert_matches!(
            change.apply(Some(&original)),
            Err(ModelError::InvalidSetting(_))
        );
    }

    #[test]
    fn test_node_setting_targets() {
        let original = activated();
        let node_uid = original.find_node("node-2").unwrap().uid;

        let one = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Node(node_uid), Setting::NodeLogDir, None, "/logs")
                .unwrap(),
        );
        let cluster = one.apply(Some(&original)).unwrap();
        assert!(!cluster.find_node("node-1").unwrap().settings.contains_key("log-dir"));
        assert_eq!(cluster.find_node("node-2").unwrap().settings["log-dir"], "/logs");

        let all = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Cluster, Setting::NodeLogDir, None, "/var/log")
                .unwrap(),
        );
        let cluster = all.apply(Some(&cluster)).unwrap();
        assert!(cluster.nodes().all(|node| node.settings["log-dir"] == "/var/log"));
    }

    #[test]
    fn test_node_port() {
        let original = activated();
        let node_uid = original.find_node("node-1").unwrap().uid;

        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Node(node_uid), Setting::NodePort, None, "9510")
                .unwrap(),
        );
        assert_eq!(change.apply(Some(&original)).unwrap().node(&node_uid).unwrap().port, 9510);

        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Node(node_uid), Setting::NodePort, None, "high")
                .unwrap(),
        );
        assert_matches!(
            change.apply(Some(&original)),
            Err(ModelError::InvalidSetting(_))
        );
    }

    #[test]
    fn test_unset_map_setting() {
        let original = activated();
        let change = DynamicConfigNomadChange::MultiSetting {
            changes: vec![
                SettingChange::parse(
                    Applicability::Cluster,
                    SettingOperation::Set,
                    "offheap-resources.main=512MB",
                )
                .unwrap(),
                SettingChange::parse(
                    Applicability::Cluster,
                    SettingOperation::Set,
                    "offheap-resources.second=1GB",
                )
                .unwrap(),
            ],
        };
        let cluster = change.apply(Some(&original)).unwrap();
        assert_eq!(cluster.settings.len(), 2);
        assert_eq!(
            change.summary(),
            "set offheap-resources.main=512MB, set offheap-resources.second=1GB"
        );

        let one = DynamicConfigNomadChange::Setting(
            SettingChange::parse(
                Applicability::Cluster,
                SettingOperation::Unset,
                "offheap-resources.main",
            )
            .unwrap(),
        );
        assert_eq!(one.apply(Some(&cluster)).unwrap().settings.len(), 1);

        let all = DynamicConfigNomadChange::Setting(
            SettingChange::parse(
                Applicability::Cluster,
                SettingOperation::Unset,
                "offheap-resources",
            )
            .unwrap(),
        );
        assert!(all.apply(Some(&cluster)).unwrap().settings.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let parse = |op, expr| SettingChange::parse(Applicability::Cluster, op, expr);

        assert_matches!(
            parse(SettingOperation::Set, "offheap-resources=1GB"),
            Err(ModelError::InvalidSetting(_))
        );
        assert_matches!(
            parse(SettingOperation::Set, "client-reconnect-window"),
            Err(ModelError::InvalidSetting(_))
        );
        assert_matches!(
            parse(SettingOperation::Unset, "name"),
            Err(ModelError::InvalidSetting(_))
        );
        assert_matches!(
            parse(SettingOperation::Set, "bogus=1"),
            Err(ModelError::UnknownSetting(_))
        );
    }

    #[test]
    fn test_lock_and_unlock() {
        let original = activated();
        let lock = DynamicConfigNomadChange::LockConfig {
            lock_context: LockContext::new("token", "platform", "upgrade"),
        };

        let locked = lock.apply(Some(&original)).unwrap();
        assert!(locked.is_locked());
        assert_eq!(lock.summary(), "Locking the config by platform (upgrade)");
        assert_matches!(lock.apply(Some(&locked)), Err(ModelError::Conflict(_)));

        let unlock = DynamicConfigNomadChange::UnlockConfig { forced: false };
        assert!(!unlock.apply(Some(&locked)).unwrap().is_locked());
    }

    #[test]
    fn test_lock_aware_wrapping() {
        let original = activated();
        let inner = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Cluster, Setting::ClusterName, None, "renamed")
                .unwrap(),
        );
        let wrapped = inner.clone().with_lock_token("token");

        assert_eq!(wrapped.without_lock(), &inner);
        assert_eq!(wrapped.summary(), inner.summary());
        assert_eq!(wrapped.apply(Some(&original)).unwrap().name, "renamed");
    }

    #[test]
    fn test_topology_changes_record_the_result() {
        let original = activated();
        let stripe_uid = original.stripes[0].uid;

        let addition = DynamicConfigNomadChange::node_addition(
            &original,
            stripe_uid,
            Node::new("node-3", "localhost", 9430),
        )
        .unwrap();
        let grown = addition.apply(Some(&original)).unwrap();
        assert_eq!(addition.topology(), Some(&grown));
        assert_eq!(
            addition.summary(),
            "Attaching node: localhost:9430 to stripe: stripe-1"
        );

        let node_uid = grown.find_node("node-3").unwrap().uid;
        let removal = DynamicConfigNomadChange::node_removal(&grown, &node_uid).unwrap();
        assert_eq!(removal.apply(Some(&grown)).unwrap(), original);
        assert_eq!(removal.topology(), Some(&original));

        let stripe = Stripe::new("stripe-2", vec![Node::new("node-4", "localhost", 9440)]);
        let stripe_uid = stripe.uid;
        let addition = DynamicConfigNomadChange::stripe_addition(&original, stripe).unwrap();
        let grown = addition.apply(Some(&original)).unwrap();
        assert_eq!(grown.stripes.len(), 2);

        let removal = DynamicConfigNomadChange::stripe_removal(&grown, &stripe_uid).unwrap();
        assert_eq!(removal.topology(), Some(&original));
        assert!(removal.summary().starts_with("Detaching stripe: [localhost:9440]"));
    }

    #[test]
    fn test_json_is_tagged_by_type() {
        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(Applicability::Cluster, Setting::ClusterName, None, "renamed")
                .unwrap(),
        )
        .with_lock_token("token");

        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "lockAware");
        assert_eq!(json["lockToken"], "token");
        assert_eq!(json["change"]["type"], "setting");
        assert_eq!(json["change"]["setting"], "cluster-name");

        let back: DynamicConfigNomadChange = serde_json::from_value(json).unwrap();
        assert_eq!(back, change);
    }
}
