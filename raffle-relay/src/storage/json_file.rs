//! JSON file backed credential store.
//!
//! The whole map lives in a single pretty-printed JSON object (`{"<participant>": "<token>"}`).
//! Every mutation is a load/modify/save cycle under one async mutex, and saves go through a
//! temporary file plus rename so a crash mid-write never leaves a truncated file behind.
//! Mutations refuse to run against a file they can't read or parse; reads fall back to empty.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{CredentialStore, Result, StorageError};
use crate::types::ParticipantId;

pub struct JsonFileStore {
    path: PathBuf,
    // Guards the backing file, not an in-memory copy: the file is the source of truth.
    lock: Mutex<()>,
}

/// The on-disk map. Values stay untyped so entries this service didn't write survive a rewrite.
type StoredMap = Map<String, Value>;

impl JsonFileStore {
    /// Open (or initialise) a store at `path`.
    ///
    /// Creates the parent directory and an empty `{}` file if they don't exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { path, lock: Mutex::new(()) };

        let exists = tokio::fs::try_exists(&store.path).await.map_err(|source| StorageError::Io {
            path: store.path.clone(),
            source,
        })?;
        if !exists {
            info!(path = %store.path.display(), "Initialising empty credential store");
            store.save(&StoredMap::new()).await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full map for a mutation. Callers must hold `self.lock`.
    ///
    /// Only a missing file counts as empty. Anything else is an error, so a store that can't be
    /// read is never rewritten with a partial map.
    async fn load_for_update(&self) -> Result<StoredMap> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Read the participant tokens, treating any failure as an empty store. Callers must hold
    /// `self.lock`.
    async fn load_tokens(&self) -> HashMap<ParticipantId, String> {
        let map = match self.load_for_update().await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Failed to load credential store, treating as empty");
                return HashMap::new();
            }
        };

        map.into_iter()
            .filter_map(|(participant_id, value)| match value {
                Value::String(token) => Some((participant_id, token)),
                _ => {
                    warn!(participant_id, "Skipping credential entry that is not a string");
                    None
                }
            })
            .collect()
    }

    /// Durably replace the backing file. Callers must hold `self.lock`.
    async fn save(&self, data: &StoredMap) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(data)?;
        let tmp_path = self.tmp_path();
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Tokens are bearer credentials: keep the file private to the service user.
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await.map_err(io_err)?;
        file.write_all(&encoded).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), entries = data.len(), "Persisted credential store");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    #[instrument(skip(self, token))]
    async fn set(&self, participant_id: &str, token: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_for_update().await?;
        data.insert(participant_id.to_string(), Value::String(token.to_string()));
        self.save(&data).await?;
        info!(participant_id, "Stored API key");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, participant_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.load_for_update().await?;
        if data.remove(participant_id).is_none() {
            debug!(participant_id, "No API key to remove");
            return Ok(false);
        }
        self.save(&data).await?;
        info!(participant_id, "Removed API key");
        Ok(true)
    }

    async fn get(&self, participant_id: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.load_tokens().await.remove(participant_id)
    }

    async fn list_all(&self) -> HashMap<ParticipantId, String> {
        let _guard = self.lock.lock().await;
        self.load_tokens().await
    }

    async fn count(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.load_tokens().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn open_temp_store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("database").join("user_keys.json"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_initialises_empty_file() {
        let (_dir, store) = open_temp_store().await;

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(contents.trim(), "{}");
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, store) = open_temp_store().await;

        store.set("1001", "key-aaaaaaaaaa").await.unwrap();
        assert_eq!(store.get("1001").await.as_deref(), Some("key-aaaaaaaaaa"));
        assert_eq!(store.get("2002").await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_token() {
        let (_dir, store) = open_temp_store().await;

        store.set("1001", "first-token").await.unwrap();
        store.set("1001", "second-token").await.unwrap();

        assert_eq!(store.get("1001").await.as_deref(), Some("second-token"));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = open_temp_store().await;
        store.set("1001", "key-aaaaaaaaaa").await.unwrap();

        assert!(store.remove("1001").await.unwrap());
        assert_eq!(store.get("1001").await, None);

        // Second removal and never-set ids report nothing removed
        assert!(!store.remove("1001").await.unwrap());
        assert!(!store.remove("never-set").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_all_is_a_snapshot() {
        let (_dir, store) = open_temp_store().await;
        store.set("a", "token-a").await.unwrap();
        store.set("b", "token-b").await.unwrap();

        let snapshot = store.list_all().await;
        store.set("c", "token-c").await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a").map(String::as_str), Some("token-a"));
        assert_eq!(store.count().await, 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_keys.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.set("1001", "persisted").await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("1001").await.as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let (_dir, store) = open_temp_store().await;
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        assert_eq!(store.count().await, 0);
        assert!(store.list_all().await.is_empty());
        assert_eq!(store.get("1001").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_overwritten() {
        let (_dir, store) = open_temp_store().await;
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        let err = store.set("1001", "fresh").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }), "{err}");
        let err = store.remove("1001").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }), "{err}");

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(contents, "{not json");
    }

    #[tokio::test]
    async fn test_set_keeps_entries_it_did_not_write() {
        let (_dir, store) = open_temp_store().await;
        tokio::fs::write(store.path(), br#"{"a":"token-a","b":"token-b","legacy":12345}"#)
            .await
            .unwrap();

        // Non-string values are invisible to readers
        assert_eq!(store.count().await, 2);

        store.set("c", "token-c").await.unwrap();

        assert_eq!(store.get("a").await.as_deref(), Some("token-a"));
        assert_eq!(store.get("b").await.as_deref(), Some("token-b"));
        assert_eq!(store.get("c").await.as_deref(), Some("token-c"));

        let raw: serde_json::Value = serde_json::from_slice(&tokio::fs::read(store.path()).await.unwrap()).unwrap();
        assert_eq!(raw["legacy"], 12345);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_does_not_replace_a_path_it_cannot_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_keys.json");
        // A self-referencing symlink: stat fails with ELOOP rather than "not found"
        std::os::unix::fs::symlink(&path, &path).unwrap();

        let err = JsonFileStore::open(&path).await.err().unwrap();

        assert!(matches!(err, StorageError::Io { .. }), "{err}");
        assert!(tokio::fs::symlink_metadata(&path).await.unwrap().file_type().is_symlink());
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let (_dir, store) = open_temp_store().await;
        tokio::fs::remove_file(store.path()).await.unwrap();

        assert_eq!(store.count().await, 0);
        assert_eq!(store.get("anyone").await, None);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("database");
        let store = JsonFileStore::open(db_dir.join("user_keys.json")).await.unwrap();

        // Pull the directory out from under the store so the temp file can't be created
        tokio::fs::remove_dir_all(&db_dir).await.unwrap();

        let err = store.set("1001", "token").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        // A missing file is an empty store, so there is nothing to remove
        assert!(!store.remove("1001").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_sets_are_not_lost() {
        let (_dir, store) = open_temp_store().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(&format!("user-{i}"), &format!("token-{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.count().await, 25);
        assert_eq!(store.get("user-7").await.as_deref(), Some("token-7"));
    }
}
