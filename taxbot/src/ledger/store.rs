//! Storage seam for the ledger record.
//!
//! One fixed logical key, three base operations (`get`, `put`, `update`) and
//! an `increment` convenience. The default `increment` is a read-then-write
//! sequence: two entries that interleave between the read and the write lose
//! one of the updates. Adapters should override it with an atomic primitive;
//! both adapters in this module do.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use thiserror::Error;

use super::{apply_delta, Category, LedgerError, LedgerRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Read or write against the backend failed. Not retried; transient and
    /// permanent failures are treated identically.
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self) -> Result<LedgerRecord, StoreError>;

    /// Full overwrite of the record.
    async fn put(&self, record: LedgerRecord) -> Result<(), StoreError>;

    /// Set one category's total to `new_value`, returning the new record.
    async fn update(&self, category: Category, new_value: i64)
        -> Result<LedgerRecord, StoreError>;

    /// Add `delta` to one category's total, returning the new record.
    ///
    /// Default implementation is NOT atomic across concurrent callers.
    async fn increment(&self, category: Category, delta: i64) -> Result<LedgerRecord, StoreError> {
        let current = self.get().await?.total_for(category);
        let next = apply_delta(current, delta)?;
        self.update(category, next).await
    }
}

/// Mutex-guarded record, used in tests and when no database path is
/// configured. `increment` holds the lock across read and write.
pub struct InMemoryLedgerStore {
    record: Mutex<LedgerRecord>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_record(LedgerRecord::zeroed())
    }

    pub fn with_record(record: LedgerRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerRecord>, StoreError> {
        self.record
            .lock()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".to_string()))
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self) -> Result<LedgerRecord, StoreError> {
        Ok(*self.lock()?)
    }

    async fn put(&self, record: LedgerRecord) -> Result<(), StoreError> {
        *self.lock()? = record;
        Ok(())
    }

    async fn update(&self, category: Category, new_value: i64)
        -> Result<LedgerRecord, StoreError> {
        let mut guard = self.lock()?;
        *guard = guard.with_total(category, new_value);
        Ok(*guard)
    }

    async fn increment(&self, category: Category, delta: i64) -> Result<LedgerRecord, StoreError> {
        let mut guard = self.lock()?;
        let next = apply_delta(guard.total_for(category), delta)?;
        *guard = guard.with_total(category, next);
        Ok(*guard)
    }
}

/// SQLite-backed adapter: a single-row table keyed by a fixed primary key,
/// mirroring the one aggregate record. `increment` runs as one UPDATE
/// statement, which removes the read-modify-write race.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    db_path: Option<PathBuf>,
}

impl SqliteLedgerStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let db_path = path.into();
        let conn = Connection::open(&db_path).map_err(sql_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "BEGIN;CREATE TABLE IF NOT EXISTS taxes(
                pk INTEGER PRIMARY KEY CHECK (pk = 0),
                pcp_total INTEGER NOT NULL DEFAULT 0,
                weed_total INTEGER NOT NULL DEFAULT 0
            );INSERT OR IGNORE INTO taxes(pk) VALUES (0);COMMIT;",
        )
        .map_err(sql_err)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn read_record(conn: &Connection) -> Result<LedgerRecord, StoreError> {
        conn.query_row(
            "SELECT pcp_total, weed_total FROM taxes WHERE pk = 0",
            [],
            |row| {
                Ok(LedgerRecord {
                    pcp_total: row.get(0)?,
                    weed_total: row.get(1)?,
                })
            },
        )
        .map_err(sql_err)
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get(&self) -> Result<LedgerRecord, StoreError> {
        let conn = self.lock()?;
        Self::read_record(&conn)
    }

    async fn put(&self, record: LedgerRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE taxes SET pcp_total = ?1, weed_total = ?2 WHERE pk = 0",
            params![record.pcp_total, record.weed_total],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn update(&self, category: Category, new_value: i64)
        -> Result<LedgerRecord, StoreError> {
        let conn = self.lock()?;
        // Column names come from the closed Category enum, never from input.
        let sql = format!("UPDATE taxes SET {} = ?1 WHERE pk = 0", category.field());
        conn.execute(&sql, params![new_value]).map_err(sql_err)?;
        Self::read_record(&conn)
    }

    async fn increment(&self, category: Category, delta: i64) -> Result<LedgerRecord, StoreError> {
        let conn = self.lock()?;
        let field = category.field();
        let sql = format!(
            "UPDATE taxes SET {f} = {f} + ?1 WHERE pk = 0 AND {f} + ?1 >= 0",
            f = field
        );
        let changed = conn.execute(&sql, params![delta]).map_err(sql_err)?;
        if changed == 0 {
            return Err(StoreError::Ledger(LedgerError::NegativeResult));
        }
        Self::read_record(&conn)
    }
}
