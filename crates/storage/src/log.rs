//! Append-only log storage abstraction
//!
//! The log stores indexed byte sequences. Indexes start at 1 and are dense:
//! an append is only accepted at the position directly following the current
//! last entry, which turns every append into a compare-and-set on the log
//! length. The only in-place mutation allowed is replacing the last entry.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{Debug, Display};

/// Outcome of a storage call
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The log position did not match the caller's expectation
    #[error("Log position conflict: expected index {expected}, got {actual}")]
    Conflict {
        /// The index the log would have accepted
        expected: u64,
        /// The index the caller supplied
        actual: u64,
    },

    /// A key or a file name the backend cannot represent
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The underlying filesystem failed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// An entry that should exist does not
    #[error("Entry not found: {0}")]
    KeyNotFound(String),
}

/// Key of a metadata entry
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey(pub Bytes);

impl StorageKey {
    /// Key made of raw bytes
    pub fn new(key: impl Into<Bytes>) -> Self {
        Self(key.into())
    }

    /// The key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self(Bytes::copy_from_slice(key.as_bytes()))
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self(Bytes::from(key))
    }
}

impl From<&[u8]> for StorageKey {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

/// Independent area of a backend, one per repository
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageNamespace(String);

impl StorageNamespace {
    /// Namespace called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The namespace name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only log of indexed byte sequences
#[async_trait]
pub trait LogStorage: Clone + Send + Sync + 'static {
    /// Append one entry at `index`.
    ///
    /// `index` must be the last index plus one (or 1 for an empty log),
    /// otherwise [`StorageError::Conflict`] is returned and nothing is written.
    async fn append(&self, namespace: &StorageNamespace, index: u64, entry: Bytes)
    -> StorageResult<()>;

    /// First and last index, or `None` for an empty log
    async fn bounds(&self, namespace: &StorageNamespace) -> StorageResult<Option<(u64, u64)>>;

    /// Remove every entry of the namespace
    async fn clear(&self, namespace: &StorageNamespace) -> StorageResult<()>;

    /// Entries with `start <= index < end`
    async fn read_range(
        &self,
        namespace: &StorageNamespace,
        start: u64,
        end: u64,
    ) -> StorageResult<Vec<(u64, Bytes)>>;

    /// Overwrite the entry at `index`, which must be the last one
    async fn replace_last(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()>;

    /// Read every entry, oldest first
    async fn read_all(&self, namespace: &StorageNamespace) -> StorageResult<Vec<(u64, Bytes)>> {
        match self.bounds(namespace).await? {
            Some((first, last)) => self.read_range(namespace, first, last + 1).await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl<T: LogStorage> LogStorage for std::sync::Arc<T> {
    async fn append(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        (**self).append(namespace, index, entry).await
    }

    async fn bounds(&self, namespace: &StorageNamespace) -> StorageResult<Option<(u64, u64)>> {
        (**self).bounds(namespace).await
    }

    async fn clear(&self, namespace: &StorageNamespace) -> StorageResult<()> {
        (**self).clear(namespace).await
    }

    async fn read_range(
        &self,
        namespace: &StorageNamespace,
        start: u64,
        end: u64,
    ) -> StorageResult<Vec<(u64, Bytes)>> {
        (**self).read_range(namespace, start, end).await
    }

    async fn replace_last(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        (**self).replace_last(namespace, index, entry).await
    }
}

/// Compute the index the log accepts next, given its bounds
pub fn next_index(bounds: Option<(u64, u64)>) -> u64 {
    bounds.map_or(1, |(_, last)| last + 1)
}
