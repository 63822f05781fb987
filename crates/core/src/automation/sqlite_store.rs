//! SQLite-backed automation record store.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{AutomationRecord, AutomationStore, AutomationStoreError};

/// SQLite-backed automation record store.
///
/// Each record is kept as a JSON document keyed by ticket number.
pub struct SqliteAutomationStore {
    conn: Mutex<Connection>,
}

impl SqliteAutomationStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, AutomationStoreError> {
        let conn =
            Connection::open(path).map_err(|e| AutomationStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, AutomationStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AutomationStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AutomationStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS automation_records (
                ticket_number INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_automation_status ON automation_records(status);
            "#,
        )
        .map_err(|e| AutomationStoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AutomationStoreError> {
        self.conn
            .lock()
            .map_err(|e| AutomationStoreError::Database(format!("Lock poisoned: {}", e)))
    }
}

impl AutomationStore for SqliteAutomationStore {
    fn get(&self, ticket_number: u64) -> Result<Option<AutomationRecord>, AutomationStoreError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM automation_records WHERE ticket_number = ?1",
                params![ticket_number as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AutomationStoreError::Database(e.to_string()))?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| AutomationStoreError::Corrupt {
                ticket_number,
                message: e.to_string(),
            })
        })
        .transpose()
    }

    fn save(&self, record: &AutomationRecord) -> Result<(), AutomationStoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AutomationStoreError::Database(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO automation_records (ticket_number, status, record, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(ticket_number) DO UPDATE SET
                status = excluded.status,
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
            params![
                record.ticket_number as i64,
                record.status.as_str(),
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AutomationStoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn count(&self) -> Result<u64, AutomationStoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM automation_records", [], |row| {
                row.get(0)
            })
            .map_err(|e| AutomationStoreError::Database(e.to_string()))?;
        Ok(count as u64)
    }
}
