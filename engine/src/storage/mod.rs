//! Durable key/value backends.
//!
//! The local cache, the pending-operation queue and the last sync timestamp
//! are all stored as JSON strings under prefixed keys in one backend.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use crate::error::Result;
use async_trait::async_trait;

/// Key layout shared by the local store and the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Prefix shared by every cached table key.
    pub fn cache_prefix(&self) -> String {
        format!("{}cache_", self.prefix)
    }

    /// Key of a cached table.
    pub fn table(&self, table: &str) -> String {
        format!("{}cache_{}", self.prefix, table)
    }

    pub fn pending_ops(&self) -> String {
        format!("{}pending_ops", self.prefix)
    }

    pub fn pending_seq(&self) -> String {
        format!("{}pending_seq", self.prefix)
    }

    pub fn last_sync(&self) -> String {
        format!("{}last_sync", self.prefix)
    }
}

/// An async string key/value store.
///
/// A write is durable once the returned future resolves.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a value, `None` if the key was never written.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
