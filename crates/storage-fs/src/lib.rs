//! Implementation of log and metadata storage using files on disk.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<namespace>/log/<index, zero padded>.entry
//! <root>/<namespace>/meta/<hex encoded key>
//! ```
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! a crash never leaves a half-written entry behind.
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dynconf_storage::{
    LogStorage, MetadataStorage, StorageError, StorageKey, StorageNamespace, StorageResult,
    next_index,
};
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

const ENTRY_EXTENSION: &str = "entry";

/// Log and metadata storage using files on disk.
#[derive(Clone, Debug)]
pub struct FsStorage {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FsStorage {
    /// Creates a new `FsStorage` rooted at the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The root directory of this storage.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_dir(&self, namespace: &StorageNamespace) -> PathBuf {
        self.dir.join(namespace.as_str())
    }

    fn log_dir(&self, namespace: &StorageNamespace) -> PathBuf {
        self.namespace_dir(namespace).join("log")
    }

    fn meta_dir(&self, namespace: &StorageNamespace) -> PathBuf {
        self.namespace_dir(namespace).join("meta")
    }

    fn entry_path(&self, namespace: &StorageNamespace, index: u64) -> PathBuf {
        self.log_dir(namespace)
            .join(format!("{index:020}.{ENTRY_EXTENSION}"))
    }

    fn meta_path(&self, namespace: &StorageNamespace, key: &StorageKey) -> PathBuf {
        self.meta_dir(namespace).join(hex::encode(key.as_bytes()))
    }

    async fn indexes(&self, namespace: &StorageNamespace) -> StorageResult<Vec<u64>> {
        let mut indexes = Vec::new();
        for name in list_dir(&self.log_dir(namespace)).await? {
            if let Some(index) = name
                .strip_suffix(ENTRY_EXTENSION)
                .and_then(|stem| stem.strip_suffix('.'))
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                indexes.push(index);
            }
        }
        indexes.sort_unstable();
        Ok(indexes)
    }
}

fn io_error(context: &'static str, e: io::Error) -> StorageError {
    StorageError::Io(io::Error::new(e.kind(), format!("{context}: {e}")))
}

/// Lists the visible file names of a directory, empty if it does not exist.
async fn list_dir(dir: &Path) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error("error reading directory", e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("error reading directory entry", e))?
    {
        if let Some(name) = entry.file_name().to_str()
            && !name.starts_with('.')
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

async fn read_file(path: &Path) -> StorageResult<Option<Bytes>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("error reading file", e)),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| io_error("error creating directory", e))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?;
    let tmp_path = parent.join(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| io_error("error creating file", e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| io_error("error writing file", e))?;
    file.sync_all()
        .await
        .map_err(|e| io_error("error syncing file", e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| io_error("error renaming file", e))
}

#[async_trait]
impl LogStorage for FsStorage {
    async fn append(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let expected = next_index(self.bounds(namespace).await?);
        if index != expected {
            return Err(StorageError::Conflict {
                expected,
                actual: index,
            });
        }

        trace!("Appending entry {} to {:?}", index, self.log_dir(namespace));
        write_file(&self.entry_path(namespace, index), &entry).await
    }

    async fn bounds(&self, namespace: &StorageNamespace) -> StorageResult<Option<(u64, u64)>> {
        let indexes = self.indexes(namespace).await?;
        Ok(indexes.first().copied().zip(indexes.last().copied()))
    }

    async fn clear(&self, namespace: &StorageNamespace) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_dir_all(self.log_dir(namespace)).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("error removing log directory", e)),
        }
    }

    async fn read_range(
        &self,
        namespace: &StorageNamespace,
        start: u64,
        end: u64,
    ) -> StorageResult<Vec<(u64, Bytes)>> {
        let mut entries = Vec::new();
        for index in self.indexes(namespace).await? {
            if index < start || index >= end {
                continue;
            }
            let data = read_file(&self.entry_path(namespace, index))
                .await?
                .ok_or_else(|| StorageError::KeyNotFound(format!("{namespace}/{index}")))?;
            entries.push((index, data));
        }
        Ok(entries)
    }

    async fn replace_last(
        &self,
        namespace: &StorageNamespace,
        index: u64,
        entry: Bytes,
    ) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let (_, last) = self
            .bounds(namespace)
            .await?
            .ok_or_else(|| StorageError::KeyNotFound(format!("{namespace}/{index}")))?;
        if index != last {
            return Err(StorageError::Conflict {
                expected: last,
                actual: index,
            });
        }

        write_file(&self.entry_path(namespace, index), &entry).await
    }
}

#[async_trait]
impl MetadataStorage for FsStorage {
    async fn delete(&self, namespace: &StorageNamespace, key: &StorageKey) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(self.meta_path(namespace, key)).await {
            Ok(()) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("error deleting file", e)),
        }
    }

    async fn get(
        &self,
        namespace: &StorageNamespace,
        key: &StorageKey,
    ) -> StorageResult<Option<Bytes>> {
        read_file(&self.meta_path(namespace, key)).await
    }

    async fn keys(&self, namespace: &StorageNamespace) -> StorageResult<Vec<StorageKey>> {
        let mut keys = Vec::new();
        for name in list_dir(&self.meta_dir(namespace)).await? {
            let raw = hex::decode(&name).map_err(|e| StorageError::InvalidKey(e.to_string()))?;
            keys.push(StorageKey::new(raw));
        }
        keys.sort();
        Ok(keys)
    }

    async fn put(
        &self,
        namespace: &StorageNamespace,
        key: StorageKey,
        value: Bytes,
    ) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        write_file(&self.meta_path(namespace, &key), &value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_and_read() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let namespace = StorageNamespace::new("node-1");

        storage.append(&namespace, 1, Bytes::from("one")).await.unwrap();
        storage.append(&namespace, 2, Bytes::from("two")).await.unwrap();

        assert_eq!(storage.bounds(&namespace).await.unwrap(), Some((1, 2)));
        assert_eq!(
            storage.read_range(&namespace, 2, 3).await.unwrap(),
            vec![(2, Bytes::from("two"))]
        );
        assert_eq!(storage.read_all(&namespace).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_conflict() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let namespace = StorageNamespace::new("node-1");

        let result = storage.append(&namespace, 2, Bytes::from("two")).await;
        assert_matches!(
            result,
            Err(StorageError::Conflict {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(storage.bounds(&namespace).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_last_and_clear() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let namespace = StorageNamespace::new("node-1");

        storage.append(&namespace, 1, Bytes::from("one")).await.unwrap();
        storage
            .replace_last(&namespace, 1, Bytes::from("uno"))
            .await
            .unwrap();
        assert_eq!(
            storage.read_all(&namespace).await.unwrap(),
            vec![(1, Bytes::from("uno"))]
        );

        storage.clear(&namespace).await.unwrap();
        assert_eq!(storage.bounds(&namespace).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let namespace = StorageNamespace::new("node-1");

        {
            let storage = FsStorage::new(dir.path());
            storage.append(&namespace, 1, Bytes::from("one")).await.unwrap();
            storage
                .put(&namespace, StorageKey::from("state"), Bytes::from("s"))
                .await
                .unwrap();
        }

        let storage = FsStorage::new(dir.path());
        assert_eq!(storage.bounds(&namespace).await.unwrap(), Some((1, 1)));
        assert_eq!(
            storage
                .get(&namespace, &StorageKey::from("state"))
                .await
                .unwrap(),
            Some(Bytes::from("s"))
        );
    }

    #[tokio::test]
    async fn test_metadata_keys_roundtrip_binary_names() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let namespace = StorageNamespace::new("node-1");

        storage
            .put(&namespace, StorageKey::from("config/7"), Bytes::from("x"))
            .await
            .unwrap();
        storage
            .put(&namespace, StorageKey::from("state"), Bytes::from("y"))
            .await
            .unwrap();

        assert_eq!(
            storage.keys(&namespace).await.unwrap(),
            vec![StorageKey::from("config/7"), StorageKey::from("state")]
        );
        assert!(
            storage
                .delete(&namespace, &StorageKey::from("config/7"))
                .await
                .unwrap()
        );
        assert_eq!(storage.keys(&namespace).await.unwrap().len(), 1);
    }
}
