//! In-memory log and metadata storage implementation

use async_trait::async_trait;
use bytes::Bytes;
use dynconf_storage::{
    LogStorage, MetadataStorage, StorageError, StorageKey, StorageNamespace, StorageResult,
    next_index,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory storage implementation using BTreeMap for ordering
#[derive(Clone)]
pub struct MemoryStorage {
    /// Log storage: namespace -> (index -> bytes)
    logs: Arc<RwLock<HashMap<StorageNamespace, BTreeMap<u64, Bytes>>>>,
    /// Metadata storage: namespace -> (key -> bytes)
    metadata: Arc<RwLock<HashMap<StorageNamespace, BTreeMap<StorageKey, Bytes>>>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage instance
    pub fn new() -> Self {
        Self {
            logs: Arc::new(RwLock::new(HashMap::new())),
            metadata: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn bounds_of(btree: &BTreeMap<u64, Bytes>) -> Option<(u64, u64)> {
    let (&first, _) = btree.iter().next()?;
    let (&last, _) = btree.iter().next_back()?;
    Some((first, last))
}

#[async_trait]
impl LogStorage for MemoryStorage {
    async fn append(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        let mut logs = self.logs.write().await;
        let btree = logs.entry(namespace.clone()).or_default();

        let expected = next_index(bounds_of(btree));
        if index != expected {
            return Err(StorageError::Conflict {
                expected,
                actual: index,
            });
        }

        trace!("Appending entry {} to {}", index, namespace);
        btree.insert(index, entry);
        Ok(())
    }

    async fn bounds(&self, namespace: &StorageNamespace) -> StorageResult<Option<(u64, u64)>> {
        let logs = self.logs.read().await;
        Ok(logs.get(namespace).and_then(bounds_of))
    }

    async fn clear(&self, namespace: &StorageNamespace) -> StorageResult<()> {
        let mut logs = self.logs.write().await;
        logs.remove(namespace);
        Ok(())
    }

    async fn read_range(
        &self,
        namespace: &StorageNamespace,
        start: u64,
        end: u64,
    ) -> StorageResult<Vec<(u64, Bytes)>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let logs = self.logs.read().await;

        if let Some(btree) = logs.get(namespace) {
            let entries: Vec<_> = btree
                .range(start..end)
                .map(|(&idx, data)| (idx, data.clone()))
                .collect();
            Ok(entries)
        } else {
            Ok(Vec::new())
        }
    }

    async fn replace_last(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        let mut logs = self.logs.write().await;

        let btree = logs
            .get_mut(namespace)
            .ok_or_else(|| StorageError::KeyNotFound(format!("{namespace}/{index}")))?;
        let (_, last) = bounds_of(btree)
            .ok_or_else(|| StorageError::KeyNotFound(format!("{namespace}/{index}")))?;

        if index != last {
            return Err(StorageError::Conflict {
                expected: last,
                actual: index,
            });
        }

        btree.insert(index, entry);
        Ok(())
    }
}

#[async_trait]
impl MetadataStorage for MemoryStorage {
    async fn delete(&self, namespace: &StorageNamespace, key: &StorageKey) -> StorageResult<bool> {
        let mut metadata = self.metadata.write().await;
        Ok(metadata
            .get_mut(namespace)
            .is_some_and(|values| values.remove(key).is_some()))
    }

    async fn get(
        &self,
        namespace: &StorageNamespace,
        key: &StorageKey,
    ) -> StorageResult<Option<Bytes>> {
        let metadata = self.metadata.read().await;
        Ok(metadata
            .get(namespace)
            .and_then(|values| values.get(key))
            .cloned())
    }

    async fn keys(&self, namespace: &StorageNamespace) -> StorageResult<Vec<StorageKey>> {
        let metadata = self.metadata.read().await;
        Ok(metadata
            .get(namespace)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn put(
        &self,
        namespace: &StorageNamespace,
        key: StorageKey,
        value: Bytes,
    ) -> StorageResult<()> {
        let mut metadata = self.metadata.write().await;
        metadata
            .entry(namespace.clone())
            .or_default()
            .insert(key, value);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("logs", &"<locked>")
            .field("metadata", &"<locked>")
            .finish()
    }
}
