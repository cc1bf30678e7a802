//! JSON-file storage backend
//!
//! The whole namespace lives in one JSON object on disk. It is loaded once
//! when the storage is opened and rewritten after every `set_raw`. Writes go
//! to a sibling temporary file that is then renamed over the original, so a
//! crash mid-write leaves the previous snapshot intact.
//!
//! Two processes opening the same file do not see each other's writes; the
//! last one to write wins.

use async_trait::async_trait;
use forumstat_core::error::{ForumstatError, Result};
use forumstat_core::storage::Storage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Environment variable overriding the default storage file
pub const DATA_PATH_ENV: &str = "FORUMSTAT_DATA";

/// Default location of the storage file
///
/// `$FORUMSTAT_DATA` when set, otherwise `<data dir>/forumstat/storage.json`.
pub fn default_storage_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(DATA_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::data_dir()
        .ok_or_else(|| ForumstatError::Config("Cannot determine data directory".into()))?;
    Ok(base.join("forumstat").join("storage.json"))
}

/// Storage persisted as a single JSON object
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStorage {
    /// Open `path`, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| ForumstatError::Storage {
                key: path.display().to_string(),
                reason: format!("corrupt storage file: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Storage file {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Opened {} with {} keys", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        // Held across the flush so file writes are never interleaved
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries).await {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.entries.lock().await.clone())
    }
}
