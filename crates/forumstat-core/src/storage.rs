//! Key-value storage abstraction
//!
//! Storage is the only persistence mechanism. Keys are opaque strings scoped
//! by convention as `<namespace>:<kind>:<user>[:<year>]`; values are JSON.
//!
//! # Concurrency
//!
//! Implementations are expected to serialize operations within one process,
//! but nothing coordinates separate processes (or separate storage handles)
//! writing the same namespace. Such writers race and the last write wins.
//! Callers keep a single writer per user namespace; there is no locking or
//! compare-and-swap at this layer.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Trait for key-value storage backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the raw JSON value under `key`, `None` when absent
    async fn get_raw(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value under `key`
    async fn set_raw(&self, key: &str, value: Value) -> Result<()>;

    /// Copy of every key and value currently stored
    async fn snapshot(&self) -> Result<BTreeMap<String, Value>>;
}

/// Typed helpers over [`Storage`]
#[async_trait]
pub trait StorageExt: Storage {
    /// Read and deserialize `key`, `None` when absent or `null`
    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Read `key`, falling back to `fallback` when absent
    async fn get_or<T>(&self, key: &str, fallback: T) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get(key).await?.unwrap_or(fallback))
    }

    /// Serialize and store `value` under `key`
    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_raw(key, value).await
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Bytes used by one kind of key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindUsage {
    pub keys: usize,
    pub bytes: usize,
}

/// Storage accounting for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub namespace: String,
    pub total_keys: usize,
    pub total_bytes: usize,
    /// Keyed by the `<kind>` segment of the storage key
    pub by_kind: BTreeMap<String, KindUsage>,
}

/// Sum serialized key and value sizes of every key under `namespace`.
///
/// Keys outside the namespace are ignored.
pub async fn storage_usage(storage: &dyn Storage, namespace: &str) -> Result<StorageUsage> {
    let prefix = format!("{namespace}:");
    let mut usage = StorageUsage {
        namespace: namespace.to_string(),
        ..StorageUsage::default()
    };

    for (key, value) in storage.snapshot().await? {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let kind = rest.split(':').next().unwrap_or(rest).to_string();
        let bytes = key.len() + serde_json::to_string(&value)?.len();

        let entry = usage.by_kind.entry(kind).or_default();
        entry.keys += 1;
        entry.bytes += bytes;
        usage.total_keys += 1;
        usage.total_bytes += bytes;
    }

    Ok(usage)
}
