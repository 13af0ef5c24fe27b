/*!
Durable log of delivered deletions
*/

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{
    error::{MonitorError, Result},
    event::DeletionEvent,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A persisted deletion, as served by the log retrieval endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDeletion {
    pub id: i64,
    /// UTC, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub file_path: String,
    pub deleted_by: String,
}

/// Append-only table of deletions backed by SQLite
pub struct DeletionStore {
    conn: Connection,
    table: String,
}

/// True for names that are safe to splice into SQL as a table name
pub fn is_valid_table_name(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl DeletionStore {
    /// Opens (or creates) the database and makes sure the table exists
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::with_connection(Connection::open(path)?, table)?;
        info!("Deletion store ready at {:?} (table {})", path, store.table);
        Ok(store)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(MonitorError::Config(format!("invalid table name `{}`", table)));
        }
        let store = Self {
            conn,
            table: table.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create-if-absent, so repeated startups are harmless
    fn initialize_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                file_path TEXT NOT NULL,
                deleted_by TEXT NOT NULL,
                event_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}(timestamp);
            "#,
            table = self.table
        ))
    }

    /// Appends one row and returns its id
    pub fn append(&self, event: &DeletionEvent) -> Result<i64> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (timestamp, file_path, deleted_by, event_id) VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![
                event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                event.path_or_missing(),
                event.user_name_or_unknown(),
                event.event_id,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Stored deletion {} for {}", id, event.path_or_missing());
        Ok(id)
    }

    /// All rows recorded on the given UTC day, oldest first
    pub fn logs_for_date(&self, date: NaiveDate) -> Result<Vec<StoredDeletion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, timestamp, file_path, deleted_by
             FROM {}
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY id ASC",
            self.table
        ))?;

        let start = format!("{} 00:00:00", date.format("%Y-%m-%d"));
        let end = match date.succ_opt() {
            Some(next) => format!("{} 00:00:00", next.format("%Y-%m-%d")),
            None => "9999-12-31 23:59:60".to_string(),
        };

        let rows = stmt.query_map(params![start, end], |row| {
            Ok(StoredDeletion {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                file_path: row.get(2)?,
                deleted_by: row.get(3)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }
}
