//! `dynconf`: change the configuration of a local cluster
//!
//! Every node of the cluster keeps its configuration repository under one
//! directory. Commands drive the Nomad protocol against all of them, so a
//! change lands on every node or on none.
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod local;

pub use cli::{Args, Command};
pub use commands::run;
pub use error::{Error, Result};
pub use local::LocalCluster;
