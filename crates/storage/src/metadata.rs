//! Key-value metadata storage
//!
//! Small values kept next to a log: server state records, staged
//! configurations. Values are opaque bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{StorageKey, StorageNamespace, StorageResult};

/// A namespaced key-value store with asynchronous operations.
#[async_trait]
pub trait MetadataStorage: Clone + Send + Sync + 'static {
    /// Deletes a key. Returns true if the key existed.
    async fn delete(&self, namespace: &StorageNamespace, key: &StorageKey) -> StorageResult<bool>;

    /// Retrieves the value associated with a key.
    async fn get(&self, namespace: &StorageNamespace, key: &StorageKey)
    -> StorageResult<Option<Bytes>>;

    /// Retrieves all keys of the namespace, in key order.
    async fn keys(&self, namespace: &StorageNamespace) -> StorageResult<Vec<StorageKey>>;

    /// Stores a key-value pair, replacing any previous value.
    async fn put(
        &self,
        namespace: &StorageNamespace,
        key: StorageKey,
        value: Bytes,
    ) -> StorageResult<()>;
}

#[async_trait]
impl<T: MetadataStorage> MetadataStorage for std::sync::Arc<T> {
    async fn delete(&self, namespace: &StorageNamespace, key: &StorageKey) -> StorageResult<bool> {
        (**self).delete(namespace, key).await
    }

    async fn get(
        &self,
        namespace: &StorageNamespace,
        key: &StorageKey,
    ) -> StorageResult<Option<Bytes>> {
        (**self).get(namespace, key).await
    }

    async fn keys(&self, namespace: &StorageNamespace) -> StorageResult<Vec<StorageKey>> {
        (**self).keys(namespace).await
    }

    async fn put(
        &self,
        namespace: &StorageNamespace,
        key: StorageKey,
        value: Bytes,
    ) -> StorageResult<()> {
        (**self).put(namespace, key, value).await
    }
}
