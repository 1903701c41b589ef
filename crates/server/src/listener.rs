//! Notifications of committed configuration changes

use dynconf_model::{DynamicConfigNomadChange, Node, SettingChange, Stripe, Uid};
use dynconf_nomad::NomadChange;
use tracing::info;

/// Observer of committed configuration changes.
///
/// Every callback defaults to a no-op.
pub trait DynamicConfigListener: Send + Sync + 'static {
    /// Any committed change, before the more specific callbacks
    fn on_change_committed(&self, _change: &DynamicConfigNomadChange) {}

    /// The cluster was activated
    fn on_cluster_activation(&self, _cluster_name: &str) {}

    /// A setting was set or unset
    fn on_setting_changed(&self, _change: &SettingChange) {}

    /// A node joined a stripe
    fn on_node_addition(&self, _stripe_uid: &Uid, _node: &Node) {}

    /// A node left a stripe
    fn on_node_removal(&self, _stripe_uid: &Uid, _node: &Node) {}

    /// A stripe joined the cluster
    fn on_stripe_addition(&self, _stripe: &Stripe) {}

    /// A stripe left the cluster
    fn on_stripe_removal(&self, _stripe: &Stripe) {}

    /// The configuration lock was taken or released
    fn on_lock_changed(&self, _locked: bool) {}
}

/// Call the callbacks of `listener` matching `change`
pub(crate) fn notify(listener: &dyn DynamicConfigListener, change: &DynamicConfigNomadChange) {
    listener.on_change_committed(change);

    match change.without_lock() {
        DynamicConfigNomadChange::ClusterActivation { cluster } => {
            listener.on_cluster_activation(&cluster.name)
        }
        DynamicConfigNomadChange::NodeAddition {
            stripe_uid, node, ..
        } => listener.on_node_addition(stripe_uid, node),
        DynamicConfigNomadChange::NodeRemoval {
            stripe_uid, node, ..
        } => listener.on_node_removal(stripe_uid, node),
        DynamicConfigNomadChange::StripeAddition { stripe, .. } => {
            listener.on_stripe_addition(stripe)
        }
        DynamicConfigNomadChange::StripeRemoval { stripe, .. } => {
            listener.on_stripe_removal(stripe)
        }
        DynamicConfigNomadChange::Setting(setting) => listener.on_setting_changed(setting),
        DynamicConfigNomadChange::MultiSetting { changes } => {
            for setting in changes {
                listener.on_setting_changed(setting);
            }
        }
        DynamicConfigNomadChange::LockConfig { .. } => listener.on_lock_changed(true),
        DynamicConfigNomadChange::UnlockConfig { .. } => listener.on_lock_changed(false),
        DynamicConfigNomadChange::LockAware { .. } => {}
    }
}

/// Logs every committed change
#[derive(Debug, Default)]
pub struct TracingConfigListener;

impl DynamicConfigListener for TracingConfigListener {
    fn on_change_committed(&self, change: &DynamicConfigNomadChange) {
        info!("Configuration change committed: {}", change.summary());
    }

    fn on_node_addition(&self, stripe_uid: &Uid, node: &Node) {
        info!("Node {} ({}) added to stripe {}", node.name, node.address(), stripe_uid);
    }

    fn on_node_removal(&self, stripe_uid: &Uid, node: &Node) {
        info!("Node {} ({}) removed from stripe {}", node.name, node.address(), stripe_uid);
    }
}
