use camino::Utf8Path;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::error::LoaderError;

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _progress (
    stage_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    completed_at TEXT NOT NULL
)";

/// Handle to the single SQLite base: the progress ledger plus one table per
/// lookup/fact dataset. Owned by the orchestrator and passed down; there is
/// no ambient connection state.
pub struct Db {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub stage_id: String,
    pub status: String,
    pub completed_at: String,
}

impl Db {
    pub fn open(path: &Utf8Path) -> Result<Self, LoaderError> {
        let conn = Connection::open(path.as_std_path())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, LoaderError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LoaderError> {
        conn.execute_batch(LEDGER_DDL)?;
        Ok(Self { conn })
    }

    // Ledger. A stage is complete once its row says ok; rows are upserted,
    // never deleted, so a crash between write and commit is retried safely.

    pub fn is_complete(&self, stage_id: &str) -> Result<bool, LoaderError> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM _progress WHERE stage_id = ?1",
                [stage_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.as_deref() == Some("ok"))
    }

    pub fn mark_complete(&self, stage_id: &str) -> Result<(), LoaderError> {
        let completed_at = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO _progress (stage_id, status, completed_at) \
             VALUES (?1, 'ok', ?2)",
            params![stage_id, completed_at],
        )?;
        Ok(())
    }

    pub fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, LoaderError> {
        let mut stmt = self.conn.prepare(
            "SELECT stage_id, status, completed_at FROM _progress ORDER BY stage_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LedgerEntry {
                stage_id: row.get(0)?,
                status: row.get(1)?,
                completed_at: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    // Table store. Table and column names come from the static schema
    // declarations, never from input data.

    pub fn drop_table(&self, name: &str) -> Result<(), LoaderError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {name}"))?;
        Ok(())
    }

    pub fn create_text_table(&self, name: &str, columns: &[&str]) -> Result<(), LoaderError> {
        let cols = columns
            .iter()
            .map(|col| format!("{col} TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn
            .execute_batch(&format!("CREATE TABLE {name} ({cols})"))?;
        Ok(())
    }

    /// Bulk append inside one transaction; rows are committed before the
    /// caller can mark the owning stage complete.
    pub fn append_rows<I>(&self, name: &str, width: usize, rows: I) -> Result<u64, LoaderError>
    where
        I: IntoIterator<Item = Result<Vec<String>, LoaderError>>,
    {
        let placeholders = (1..=width)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {name} VALUES ({placeholders})");

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let row = row?;
                stmt.execute(params_from_iter(row.iter()))?;
                inserted += 1;
            }
        }
        tx.commit()?;
        debug!("appended {inserted} rows into {name}");
        Ok(inserted)
    }

    pub fn create_index(&self, table: &str, column: &str) -> Result<(), LoaderError> {
        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table} ON {table}({column})"
        ))?;
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> Result<u64, LoaderError> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, LoaderError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
