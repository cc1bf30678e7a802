//! Category dictionary for the compact balance codec
//!
//! Balance categories are long, heavily repeated strings. Stored records carry
//! a small integer id instead, resolved through an append-only list of
//! `{id, value}` pairs persisted under one key per namespace. An id never
//! changes once assigned and entries are never removed.

use forumstat_core::error::Result;
use forumstat_core::storage::{Storage, StorageExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Label used when a stored id has no dictionary entry
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Categories known before any record is seen, at fixed ids
pub const DEFAULT_CATEGORIES: [&str; 11] = [
    "每日登录奖励",
    "每日活跃度奖励",
    "连续登录奖励",
    "创建回复",
    "创建主题",
    "发送谢意",
    "收到谢意",
    "创建附言",
    "编辑主题",
    "主题回复收益",
    "初始资本",
];

/// One persisted dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: u32,
    pub value: String,
}

/// String to id mapping with stable, append-only id assignment
#[derive(Debug, Clone)]
pub struct CategoryDictionary {
    entries: Vec<CategoryEntry>,
    ids: HashMap<String, u32>,
    values: HashMap<u32, usize>,
    dirty: bool,
}

impl Default for CategoryDictionary {
    fn default() -> Self {
        Self::seeded()
    }
}

impl CategoryDictionary {
    /// Dictionary holding only [`DEFAULT_CATEGORIES`]
    pub fn seeded() -> Self {
        Self::from_entries(
            DEFAULT_CATEGORIES
                .iter()
                .zip(0u32..)
                .map(|(value, id)| CategoryEntry {
                    id,
                    value: (*value).to_string(),
                })
                .collect(),
        )
    }

    /// Rebuild from persisted entries
    ///
    /// When a value appears twice the first entry keeps it.
    pub fn from_entries(entries: Vec<CategoryEntry>) -> Self {
        let mut ids = HashMap::with_capacity(entries.len());
        let mut values = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            ids.entry(entry.value.clone()).or_insert(entry.id);
            values.entry(entry.id).or_insert(position);
        }
        Self {
            entries,
            ids,
            values,
            dirty: false,
        }
    }

    /// Read the dictionary stored under `key`, or the seeded defaults when absent
    pub async fn load(storage: &dyn Storage, key: &str) -> Result<Self> {
        match storage.get::<Vec<CategoryEntry>>(key).await? {
            Some(entries) => {
                debug!("Loaded {} categories from {}", entries.len(), key);
                Ok(Self::from_entries(entries))
            }
            None => {
                debug!("No category dictionary under {}, using defaults", key);
                Ok(Self::seeded())
            }
        }
    }

    pub fn id_of(&self, value: &str) -> Option<u32> {
        self.ids.get(value).copied()
    }

    pub fn value_of(&self, id: u32) -> Option<&str> {
        self.values
            .get(&id)
            .map(|&position| self.entries[position].value.as_str())
    }

    /// Id that the next new category will receive
    pub fn next_id(&self) -> u32 {
        self.entries
            .iter()
            .map(|entry| entry.id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Id of `value`, appending it when unseen
    ///
    /// Returns the id and whether the entry is new.
    pub fn intern(&mut self, value: &str) -> (u32, bool) {
        if let Some(id) = self.id_of(value) {
            return (id, false);
        }

        let id = self.next_id();
        info!("New balance category '{}' assigned id {}", value, id);
        self.values.insert(id, self.entries.len());
        self.ids.insert(value.to_string(), id);
        self.entries.push(CategoryEntry {
            id,
            value: value.to_string(),
        });
        self.dirty = true;
        (id, true)
    }

    /// Whether entries were added since load or the last persist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry under `key`
    pub async fn persist(&mut self, storage: &dyn Storage, key: &str) -> Result<()> {
        storage.set(key, &self.entries).await?;
        self.dirty = false;
        Ok(())
    }
}
