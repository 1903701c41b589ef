//! Evaluation of configuration changes on a node
//!
//! Before a change is staged it goes through the permission checks: a locked
//! configuration only accepts changes from the lock holder, and settings that
//! are frozen once a cluster runs cannot change after activation. The change
//! then computes the next cluster, which is staged as the node's next
//! [`NodeContext`].

use std::sync::Arc;

use dynconf_model::{ClusterState, DynamicConfigNomadChange, SettingChange};
use dynconf_nomad::{ChangeApplicator, NomadChange, NomadResult, PotentialApplicationResult};
use tracing::debug;

use crate::context::NodeContext;
use crate::listener::{DynamicConfigListener, notify};

/// The [`ChangeApplicator`] of a node's configuration repository
pub struct ConfigChangeApplicator {
    node_name: String,
    listeners: Vec<Arc<dyn DynamicConfigListener>>,
}

impl std::fmt::Debug for ConfigChangeApplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigChangeApplicator")
            .field("node_name", &self.node_name)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ConfigChangeApplicator {
    /// Applicator for the node called `node_name` in the activated cluster
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            listeners: Vec::new(),
        }
    }

    /// Notify `listener` of every committed change
    pub fn with_listener(mut self, listener: Arc<dyn DynamicConfigListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The name of the node
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    fn check_permissions(
        existing: Option<&NodeContext>,
        change: &DynamicConfigNomadChange,
    ) -> Result<(), String> {
        let Some(existing) = existing else {
            return Ok(());
        };

        if let Some(lock) = &existing.cluster.lock_context {
            let allowed = match change {
                DynamicConfigNomadChange::LockAware { lock_token, .. } => *lock_token == lock.token,
                DynamicConfigNomadChange::UnlockConfig { forced } => *forced,
                _ => false,
            };
            if !allowed {
                return Err(format!(
                    "changes are not allowed as config is locked by '{lock}'"
                ));
            }
        }

        let settings: Vec<&SettingChange> = match change.without_lock() {
            DynamicConfigNomadChange::Setting(setting) => vec![setting],
            DynamicConfigNomadChange::MultiSetting { changes } => changes.iter().collect(),
            _ => Vec::new(),
        };
        for setting in settings {
            if !setting.setting.is_writable_when(ClusterState::Activated) {
                return Err(format!(
                    "Error when applying setting change: '{}': Setting '{}' cannot be changed once a node is activated",
                    change.summary(),
                    setting.setting
                ));
            }
        }

        Ok(())
    }
}

impl ChangeApplicator<DynamicConfigNomadChange, NodeContext> for ConfigChangeApplicator {
    fn try_apply(
        &self,
        existing: Option<&NodeContext>,
        change: &DynamicConfigNomadChange,
    ) -> PotentialApplicationResult<NodeContext> {
        if let Err(reason) = Self::check_permissions(existing, change) {
            debug!("Refusing '{}': {}", change.summary(), reason);
            return PotentialApplicationResult::Reject(reason);
        }

        match change.apply(existing.map(|context| &context.cluster)) {
            Ok(cluster) => {
                PotentialApplicationResult::Allow(NodeContext::new(cluster, self.node_name.clone()))
            }
            Err(e) => PotentialApplicationResult::Reject(format!(
                "Error when trying to apply: '{}': {}",
                change.summary(),
                e
            )),
        }
    }

    fn apply(&self, change: &DynamicConfigNomadChange) -> NomadResult<()> {
        for listener in &self.listeners {
            notify(listener.as_ref(), change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use dynconf_model::{Applicability, Cluster, LockContext, Node, Setting, Stripe};

    fn activation() -> DynamicConfigNomadChange {
        DynamicConfigNomadChange::activation(Cluster::new(
            "demo",
            vec![Stripe::new(
                "stripe-1",
                vec![
                    Node::new("node-1", "localhost", 9410),
                    Node::new("node-2", "localhost", 9420),
                ],
            )],
        ))
        .unwrap()
    }

    fn activated(applicator: &ConfigChangeApplicator) -> NodeContext {
        match applicator.try_apply(None, &activation()) {
            PotentialApplicationResult::Allow(context) => context,
            PotentialApplicationResult::Reject(reason) => panic!("{reason}"),
        }
    }

    fn offheap(value: &str) -> DynamicConfigNomadChange {
        DynamicConfigNomadChange::Setting(
            SettingChange::set(
                Applicability::Cluster,
                Setting::OffheapResources,
                Some("main"),
                value,
            )
            .unwrap(),
        )
    }

    fn rejection(result: PotentialApplicationResult<NodeContext>) -> String {
        match result {
            PotentialApplicationResult::Allow(_) => panic!("change was allowed"),
            PotentialApplicationResult::Reject(reason) => reason,
        }
    }

    #[test]
    fn test_activation_locates_the_node() {
        let applicator = ConfigChangeApplicator::new("node-2");
        let context = activated(&applicator);
        assert_eq!(context.node().unwrap().port, 9420);
    }

    #[test]
    fn test_setting_change_keeps_node() {
        let applicator = ConfigChangeApplicator::new("node-1");
        let context = activated(&applicator);

        let next = applicator.try_apply(Some(&context), &offheap("1GB"));
        assert_matches!(next, PotentialApplicationResult::Allow(ref next) if
            next.node_name == "node-1"
                && next.cluster.settings["offheap-resources.main"] == "1GB");
    }

    #[test]
    fn test_frozen_settings_are_refused() {
        let applicator = ConfigChangeApplicator::new("node-1");
        let context = activated(&applicator);
        let change = DynamicConfigNomadChange::Setting(
            SettingChange::set(
                Applicability::Node(context.node().unwrap().uid),
                Setting::NodePort,
                None,
                "9999",
            )
            .unwrap(),
        );

        assert_eq!(
            rejection(applicator.try_apply(Some(&context), &change)),
            format!(
                "Error when applying setting change: 'set port=9999 on node {}': Setting 'port' cannot be changed once a node is activated",
                context.node().unwrap().uid
            )
        );
    }

    #[test]
    fn test_model_errors_are_rejections() {
        let applicator = ConfigChangeApplicator::new("node-1");
        let context = activated(&applicator);

        let reason = rejection(applicator.try_apply(Some(&context), &activation()));
        assert!(reason.starts_with("Error when trying to apply: 'Activating cluster 'demo''"));
    }

    #[test]
    fn test_locked_config() {
        let applicator = ConfigChangeApplicator::new("node-1");
        let context = activated(&applicator);
        let lock = DynamicConfigNomadChange::LockConfig {
            lock_context: LockContext::new("secret", "platform", "upgrade"),
        };
        let PotentialApplicationResult::Allow(locked) = applicator.try_apply(Some(&context), &lock)
        else {
            panic!("lock refused");
        };

        assert_eq!(
            rejection(applicator.try_apply(Some(&locked), &offheap("2GB"))),
            "changes are not allowed as config is locked by 'platform (upgrade)'"
        );
        assert!(
            rejection(applicator.try_apply(
                Some(&locked),
                &offheap("2GB").with_lock_token("wrong")
            ))
            .contains("locked by")
        );
        assert!(
            applicator
                .try_apply(Some(&locked), &offheap("2GB").with_lock_token("secret"))
                .is_allowed()
        );
        assert!(
            !applicator
                .try_apply(
                    Some(&locked),
                    &DynamicConfigNomadChange::UnlockConfig { forced: false }
                )
                .is_allowed()
        );
        assert!(
            applicator
                .try_apply(
                    Some(&locked),
                    &DynamicConfigNomadChange::UnlockConfig { forced: false }
                        .with_lock_token("secret")
                )
                .is_allowed()
        );
        assert!(
            applicator
                .try_apply(
                    Some(&locked),
                    &DynamicConfigNomadChange::UnlockConfig { forced: true }
                )
                .is_allowed()
        );
    }
}
