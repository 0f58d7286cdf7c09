//! SQLite-backed `MirrorIndex` implementation with durable persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use tokio::sync::{Mutex, Semaphore};

use crate::{IndexResult, MirrorIndex, MirrorIndexError, MirrorRecord};

/// Upper bound on concurrently open database connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Durable index backend. Connections are pooled and handed out under a
/// semaphore so concurrent event handling cannot open unbounded handles.
pub struct SqliteMirrorIndex {
    db_path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    slots: Semaphore,
}

impl SqliteMirrorIndex {
    /// Creates a SQLite-backed index at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> IndexResult<Self> {
        Self::with_max_connections(path, DEFAULT_MAX_CONNECTIONS)
    }

    pub fn with_max_connections(path: impl AsRef<Path>, max_connections: usize) -> IndexResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let index = Self {
            db_path,
            idle: Mutex::new(Vec::new()),
            slots: Semaphore::new(max_connections.max(1)),
        };
        let connection = index.open_connection()?;
        initialize_schema(&connection)?;
        Ok(index)
    }

    fn open_connection(&self) -> IndexResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    async fn with_connection<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| MirrorIndexError::PoolClosed)?;
        let mut connection = match self.idle.lock().await.pop() {
            Some(connection) => connection,
            None => self.open_connection()?,
        };
        let result = operation(&mut connection);
        self.idle.lock().await.push(connection);
        result
    }
}

fn initialize_schema(connection: &Connection) -> IndexResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS mirror_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            original_id INTEGER NOT NULL,
            original_channel INTEGER NOT NULL,
            mirror_id INTEGER NOT NULL,
            mirror_channel INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mirror_original
            ON mirror_messages (original_channel, original_id);
        "#,
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MirrorRecord> {
    Ok(MirrorRecord {
        original_id: row.get(0)?,
        original_channel: row.get(1)?,
        mirror_id: row.get(2)?,
        mirror_channel: row.get(3)?,
    })
}

const SELECT_COLUMNS: &str = "original_id, original_channel, mirror_id, mirror_channel";

#[async_trait]
impl MirrorIndex for SqliteMirrorIndex {
    async fn insert(&self, record: MirrorRecord) -> IndexResult<()> {
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO mirror_messages (original_id, original_channel, mirror_id, mirror_channel)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.original_id,
                    record.original_channel,
                    record.mirror_id,
                    record.mirror_channel
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_batch(&self, records: Vec<MirrorRecord>) -> IndexResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            {
                let mut statement = tx.prepare(
                    "INSERT INTO mirror_messages (original_id, original_channel, mirror_id, mirror_channel)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for record in &records {
                    statement.execute(params![
                        record.original_id,
                        record.original_channel,
                        record.mirror_id,
                        record.mirror_channel
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn find(
        &self,
        original_id: i64,
        original_channel: i64,
    ) -> IndexResult<Vec<MirrorRecord>> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM mirror_messages
                 WHERE original_channel = ?1 AND original_id = ?2
                 ORDER BY id"
            ))?;
            let rows = statement.query_map(params![original_channel, original_id], row_to_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    async fn find_batch(
        &self,
        original_ids: &[i64],
        original_channel: i64,
    ) -> IndexResult<Vec<MirrorRecord>> {
        if original_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_connection(move |connection| {
            let placeholders = vec!["?"; original_ids.len()].join(", ");
            let mut statement = connection.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM mirror_messages
                 WHERE original_channel = ? AND original_id IN ({placeholders})
                 ORDER BY id"
            ))?;
            let bound = std::iter::once(original_channel).chain(original_ids.iter().copied());
            let rows = statement.query_map(params_from_iter(bound), row_to_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    async fn delete(&self, original_id: i64, original_channel: i64) -> IndexResult<()> {
        self.with_connection(move |connection| {
            connection.execute(
                "DELETE FROM mirror_messages WHERE original_channel = ?1 AND original_id = ?2",
                params![original_channel, original_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_batch(&self, original_ids: &[i64], original_channel: i64) -> IndexResult<()> {
        if original_ids.is_empty() {
            return Ok(());
        }
        self.with_connection(move |connection| {
            let placeholders = vec!["?"; original_ids.len()].join(", ");
            let bound = std::iter::once(original_channel).chain(original_ids.iter().copied());
            connection.execute(
                &format!(
                    "DELETE FROM mirror_messages
                     WHERE original_channel = ? AND original_id IN ({placeholders})"
                ),
                params_from_iter(bound),
            )?;
            Ok(())
        })
        .await
    }
}
