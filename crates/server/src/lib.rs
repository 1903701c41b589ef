//! Server-side integration of dynamic configuration
//!
//! This crate wires the configuration model into the Nomad protocol:
//! - [`ConfigChangeApplicator`] evaluates changes against a node's
//!   [`NodeContext`] and notifies [`DynamicConfigListener`]s on commit
//! - [`DynamicConfigurationPassiveSync`] aligns a passive node's change log
//!   with its active node
//! - [`handle_sync_result`] turns a sync outcome into a process action
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod applicator;
pub mod context;
pub mod license;
pub mod listener;
pub mod process;
pub mod sync;

pub use applicator::ConfigChangeApplicator;
pub use context::NodeContext;
pub use license::{InMemoryLicenseService, LicenseService};
pub use listener::{DynamicConfigListener, TracingConfigListener};
pub use process::{ProcessControl, handle_sync_result};
pub use sync::{DynamicConfigSyncData, DynamicConfigurationPassiveSync, SyncError, SyncOutcome};

use std::sync::Arc;

use dynconf_model::DynamicConfigNomadChange;
use dynconf_nomad::{ChangeApplicator, NomadServer};
use dynconf_storage::{LogStorage, MetadataStorage, StorageNamespace};

/// Namespace holding a node's configuration repository
pub const CONFIG_NAMESPACE: &str = "nomad";

/// A node's Nomad server over the dynamic configuration
pub type ConfigNomadServer<S> = NomadServer<DynamicConfigNomadChange, NodeContext, S>;

/// Create the Nomad server of the node named by `applicator`
pub fn config_nomad_server<S>(storage: S, applicator: ConfigChangeApplicator) -> ConfigNomadServer<S>
where
    S: LogStorage + MetadataStorage,
{
    NomadServer::new(
        storage,
        StorageNamespace::new(CONFIG_NAMESPACE),
        Arc::new(applicator) as Arc<dyn ChangeApplicator<DynamicConfigNomadChange, NodeContext>>,
    )
}
