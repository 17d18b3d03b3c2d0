//! `SQLite`-backed engine.
//!
//! Wraps a `rusqlite` connection behind the [`SqlEngine`] trait. The
//! connection is configured for WAL journaling with a busy timeout so
//! concurrent readers are cheap and lock contention waits instead of
//! failing.

use crate::engine::{EngineError, Row, SqlEngine};
use crate::value::Value;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// `SQLite` engine over a single owned connection.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not
/// `Sync`. WAL mode and the `busy_timeout` pragma keep contention
/// graceful: concurrent readers proceed, and writers wait up to five
/// seconds for locks instead of failing immediately.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
    identity: String,
}

impl SqliteEngine {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the database cannot be opened.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(map_error)?;
        configure_connection(&conn);
        Ok(Self {
            conn: Mutex::new(conn),
            identity: format!("sqlite:{}", db_path.display()),
        })
    }

    /// Opens a private in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the database cannot be opened.
    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(map_error)?;
        configure_connection(&conn);
        Ok(Self {
            conn: Mutex::new(conn),
            identity: "sqlite::memory:".to_string(),
        })
    }

    /// Acquires the connection lock, recovering from poisoning.
    ///
    /// If a previous critical section panicked, the connection state is
    /// still valid; we log and continue rather than cascade the failure.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sqlite connection mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }
}

/// Applies the connection pragmas: WAL journaling, NORMAL synchronous,
/// and a five-second busy timeout.
fn configure_connection(conn: &Connection) {
    // journal_mode returns a result row; failures (e.g. in-memory
    // databases reporting "memory") are not errors.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

fn map_error(e: rusqlite::Error) -> EngineError {
    match e {
        rusqlite::Error::SqliteFailure(ffi_error, message) => EngineError {
            code: ffi_error.extended_code,
            message: message.unwrap_or_else(|| ffi_error.to_string()),
        },
        other => EngineError::internal(other.to_string()),
    }
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

impl SqlEngine for SqliteEngine {
    fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt.query([]).map_err(map_error)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut record = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(map_error)?;
                record.insert(column.clone(), decode(value));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn execute(&self, sql: &str) -> Result<u64, EngineError> {
        let conn = self.lock();
        let affected = conn.execute(sql, []).map_err(map_error)?;
        Ok(affected as u64)
    }

    fn insert(&self, sql: &str) -> Result<i64, EngineError> {
        let conn = self.lock();
        conn.execute(sql, []).map_err(map_error)?;
        Ok(conn.last_insert_rowid())
    }

    fn begin(&self) -> Result<(), EngineError> {
        self.lock().execute_batch("BEGIN").map_err(map_error)
    }

    fn commit(&self) -> Result<(), EngineError> {
        self.lock().execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&self) -> Result<(), EngineError> {
        self.lock().execute_batch("ROLLBACK").map_err(map_error)
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}
