//! Mirror identity index: which mirrored copies exist for an original
//! message.
//!
//! The index is what makes edits, deletes and reply threading work across
//! mirrors. Two backends are provided: a bounded in-memory map for
//! short-lived deployments and a SQLite store for durable ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

mod lru;
mod sqlite;

pub use lru::BoundedLruMap;
pub use sqlite::SqliteMirrorIndex;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, MirrorIndexError>;

/// Errors returned by index backends.
#[derive(Debug, Error)]
pub enum MirrorIndexError {
    #[error("connection pool is closed")]
    PoolClosed,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One mirrored copy of an original message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorRecord {
    pub original_id: i64,
    pub original_channel: i64,
    pub mirror_id: i64,
    pub mirror_channel: i64,
}

/// Identity mapping between originals and their mirrored copies. An original
/// fanned out to several destinations has one record per copy.
#[async_trait]
pub trait MirrorIndex: Send + Sync {
    async fn insert(&self, record: MirrorRecord) -> IndexResult<()>;

    async fn insert_batch(&self, records: Vec<MirrorRecord>) -> IndexResult<()> {
        for record in records {
            self.insert(record).await?;
        }
        Ok(())
    }

    /// All mirrored copies of one original message.
    async fn find(&self, original_id: i64, original_channel: i64)
        -> IndexResult<Vec<MirrorRecord>>;

    /// Mirrored copies for several originals from the same channel.
    async fn find_batch(
        &self,
        original_ids: &[i64],
        original_channel: i64,
    ) -> IndexResult<Vec<MirrorRecord>> {
        let mut records = Vec::new();
        for &original_id in original_ids {
            records.extend(self.find(original_id, original_channel).await?);
        }
        Ok(records)
    }

    /// Forgets every copy of one original. Deleting an unknown original is
    /// not an error.
    async fn delete(&self, original_id: i64, original_channel: i64) -> IndexResult<()>;

    async fn delete_batch(&self, original_ids: &[i64], original_channel: i64) -> IndexResult<()> {
        for &original_id in original_ids {
            self.delete(original_id, original_channel).await?;
        }
        Ok(())
    }
}

/// Default entry bound for [`InMemoryMirrorIndex`].
pub const DEFAULT_CAPACITY: usize = 100;

/// Non-durable index backend. Entries beyond the capacity are evicted least
/// recently used first, so long-running deployments lose edit and delete
/// correlation for old messages.
pub struct InMemoryMirrorIndex {
    entries: Mutex<BoundedLruMap<(i64, i64), Vec<MirrorRecord>>>,
}

impl InMemoryMirrorIndex {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedLruMap::new(capacity, 0.5)),
        }
    }
}

impl Default for InMemoryMirrorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MirrorIndex for InMemoryMirrorIndex {
    async fn insert(&self, record: MirrorRecord) -> IndexResult<()> {
        let key = (record.original_channel, record.original_id);
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&key) {
            Some(copies) => copies.push(record),
            None => {
                entries.insert(key, vec![record]);
            }
        }
        Ok(())
    }

    async fn find(
        &self,
        original_id: i64,
        original_channel: i64,
    ) -> IndexResult<Vec<MirrorRecord>> {
        let mut entries = self.entries.lock().await;
        Ok(entries
            .get(&(original_channel, original_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, original_id: i64, original_channel: i64) -> IndexResult<()> {
        self.entries
            .lock()
            .await
            .remove(&(original_channel, original_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(original_id: i64, mirror_channel: i64) -> MirrorRecord {
        MirrorRecord {
            original_id,
            original_channel: -100,
            mirror_id: original_id + 1000,
            mirror_channel,
        }
    }

    #[tokio::test]
    async fn functional_in_memory_index_tracks_all_copies_of_an_original() {
        let index = InMemoryMirrorIndex::new();
        index.insert(record(1, -201)).await.expect("insert");
        index.insert(record(1, -202)).await.expect("insert");
        index.insert(record(2, -201)).await.expect("insert");

        let copies = index.find(1, -100).await.expect("find");
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|copy| copy.original_id == 1));
    }

    #[tokio::test]
    async fn functional_in_memory_index_forgets_deleted_originals() {
        let index = InMemoryMirrorIndex::new();
        index.insert(record(1, -201)).await.expect("insert");
        index.delete(1, -100).await.expect("delete");
        assert!(index.find(1, -100).await.expect("find").is_empty());

        // Unknown originals delete cleanly.
        index.delete(999, -100).await.expect("delete");
    }

    #[tokio::test]
    async fn regression_capacity_overflow_drops_oldest_originals_only() {
        let index = InMemoryMirrorIndex::with_capacity(4);
        for original_id in 1..=5 {
            index.insert(record(original_id, -201)).await.expect("insert");
        }
        assert!(index.find(1, -100).await.expect("find").is_empty());
        assert_eq!(index.find(5, -100).await.expect("find").len(), 1);
    }
}
