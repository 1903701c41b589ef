//! Dynamic configuration model
//!
//! This crate provides:
//! - The cluster topology ([`Cluster`], [`Stripe`], [`Node`]) and its [`Uid`]s
//! - Named settings with their scope and writability ([`Setting`])
//! - Licenses and configuration locks
//! - The configuration changes carried by the Nomad protocol
//!   ([`DynamicConfigNomadChange`])
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod error;
pub mod license;
pub mod lock;
pub mod setting;
pub mod topology;
pub mod uid;

pub use change::{DynamicConfigNomadChange, SettingChange, SettingOperation};
pub use error::{ModelError, ModelResult};
pub use license::License;
pub use lock::LockContext;
pub use setting::{Applicability, ClusterState, Setting, SettingScope};
pub use topology::{Cluster, Node, Stripe};
pub use uid::Uid;
