//! Key-value store seam
//!
//! The PIN tracker and the statistics cache persist through an injected
//! `KeyValueStore`. Two implementations ship with the crate: an in-memory
//! map and a single-file JSON document written atomically.

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Asynchronous byte-oriented key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove `key`, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in ascending order
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Bound a store call by `limit`; running out of time is an `Error::Timeout`
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit)),
    }
}

fn prefix_scan(entries: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

/// In-memory store, used for session-scoped state and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(prefix_scan(&*self.entries.read().await, prefix))
    }
}

/// On-disk document format
#[derive(Default, Serialize, Deserialize)]
struct StoreDocument {
    /// Version for future migrations
    version: u32,
    /// Hex-encoded values keyed by store key
    entries: BTreeMap<String, String>,
}

/// File-backed store
///
/// The whole key space lives in one JSON document that is rewritten
/// atomically (temp file + rename) on every mutation. The in-memory map only
/// changes after the rewrite succeeds, so a failed or cancelled write never
/// leaves a value readable that was not persisted.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let document: StoreDocument = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("Failed to parse store file: {}", e)))?;
            document
                .entries
                .into_iter()
                .map(|(key, value)| {
                    hex::decode(&value)
                        .map(|bytes| (key.clone(), bytes))
                        .map_err(|e| Error::Storage(format!("Corrupt value for {}: {}", key, e)))
                })
                .collect::<Result<BTreeMap<_, _>>>()?
        } else {
            BTreeMap::new()
        };

        debug!("Opened file store at {:?} with {} keys", path, entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let document = StoreDocument {
            version: 1,
            entries: entries
                .iter()
                .map(|(key, value)| (key.clone(), hex::encode(value)))
                .collect(),
        };
        let contents = serde_json::to_string_pretty(&document)?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &contents).await?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated).await?;
        *entries = updated;
        Ok(true)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(prefix_scan(&*self.entries.read().await, prefix))
    }
}
