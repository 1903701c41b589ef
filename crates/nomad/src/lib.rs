//! Nomad: two-phase configuration change coordination
//!
//! This crate provides the protocol used to change a configuration across a
//! set of independently failing nodes:
//! - Each node owns an append-only change log guarded by a mutation counter
//!   ([`server::NomadServer`])
//! - A client discovers every node, classifies the cluster state
//!   ([`client::ConsistencyAnalyzer`]) and only then drives
//!   prepare → commit / rollback ([`client::NomadClient`])
//! - Partial failures left behind by an interrupted client are healed by a
//!   recovery run
//!
//! The protocol is generic over the change type ([`NomadChange`]) and over
//! the configuration state a change produces.
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod client;
pub mod codec;
pub mod error;
pub mod messages;
pub mod server;

#[cfg(test)]
mod test_helpers;

// Re-export main types
pub use change::{ChangeRequestState, NomadChange, NomadChangeInfo};
pub use client::{
    ChangeOutcome, ConsistencyAnalyzer, ForcedState, GlobalState, NodeAddress, NomadClient,
    NomadClientConfig, NomadEndpoint, RecoveryOutcome,
};
pub use error::{EndpointError, NomadError, NomadResult};
pub use messages::{
    AcceptRejectResponse, DiscoverResponse, MutativeMessage, Mutation, NomadServerMode,
    RejectionReason,
};
pub use server::{ChangeApplicator, NomadServer, PotentialApplicationResult};
