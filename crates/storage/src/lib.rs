//! Storage traits for the dynamic configuration repository
//!
//! This crate provides the two persistence seams the Nomad server needs: an
//! append-only index log for change records and a small key-value store for
//! the server state and staged configurations. Backends live in their own
//! crates.

pub mod log;
pub mod metadata;

// Re-export the essential types
pub use log::{LogStorage, StorageError, StorageKey, StorageNamespace, StorageResult, next_index};
pub use metadata::MetadataStorage;
