//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The sync driver calls store methods; it never executes SQL directly.

mod orders;
mod sync_run;

use rusqlite::Connection;

use crate::error::KpiResult;

pub struct OrderStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl OrderStore {
    pub fn open(path: &str) -> KpiResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> KpiResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> KpiResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_service_orders.sql"))?;
        Ok(())
    }
}

/// One persisted service order, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOrder {
    pub id: i64,
    pub order_number: String,
    pub technician_name: String,
    pub status: String,
    pub executed_at: Option<chrono::NaiveDateTime>,
    pub sync_run_id: String,
}
