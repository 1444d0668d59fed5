use async_trait::async_trait;
use rusqlite::{Connection, ToSql};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    count_query, insert_prefix, per_sender_query, DialogStore, SenderCount, StoredDialog,
    DIALOGS_TABLE, WRITE_CHUNK_ROWS,
};
use crate::error::BotResult;

/// SQLite backend for local runs and tests
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file and make sure the table exists.
    pub fn open(path: &Path) -> BotResult<Self> {
        let conn = Connection::open(path)?;
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Self::ensure_table(&conn)?;
        info!("SQLite store opened at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> BotResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_table(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn ensure_table(conn: &Connection) -> BotResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL,
                sender_name TEXT NOT NULL,
                dialog TEXT NOT NULL,
                need_to_process INTEGER NOT NULL,
                extra TEXT
            );",
            DIALOGS_TABLE
        ))?;
        Ok(())
    }
}

/// One multi-row INSERT with positional placeholders and the values to bind.
fn insert_statement(rows: &[StoredDialog]) -> (String, Vec<&dyn ToSql>) {
    let placeholders = vec!["(?, ?, ?, ?, ?)"; rows.len()].join(", ");
    let sql = format!("{}VALUES {}", insert_prefix(), placeholders);
    let params = rows
        .iter()
        .flat_map(|row| {
            let values: [&dyn ToSql; 5] = [
                &row.sender_id,
                &row.sender_name,
                &row.dialog,
                &row.need_to_process,
                &row.extra,
            ];
            values
        })
        .collect();
    (sql, params)
}

#[async_trait]
impl DialogStore for SqliteStore {
    async fn write(&self, rows: &[StoredDialog]) -> BotResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        // Nothing below awaits: the transaction and borrowed params are not Send.
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for chunk in rows.chunks(WRITE_CHUNK_ROWS) {
            let (sql, params) = insert_statement(chunk);
            inserted += tx.execute(&sql, params.as_slice())?;
        }
        tx.commit()?;

        debug!("Inserted {} dialog row(s)", inserted);
        Ok(())
    }

    async fn count_dialogs(&self) -> BotResult<i64> {
        let conn = self.conn.lock().await;
        let total: i64 = conn.query_row(&count_query(), [], |row| row.get(0))?;
        Ok(total)
    }

    async fn dialogs_per_sender(&self) -> BotResult<Vec<SenderCount>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&per_sender_query())?;
        let counts = stmt
            .query_map([], |row| {
                Ok(SenderCount {
                    sender_name: row.get(0)?,
                    dialogs: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }
}
