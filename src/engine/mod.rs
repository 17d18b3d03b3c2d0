//! SQL engine collaborator.
//!
//! The gateway drives the underlying database exclusively through
//! [`SqlEngine`]: parameterless statement execution returning a row set,
//! a generated id, or an affected-row count, plus transaction control.
//! Failures carry the engine's numeric error code and message. The
//! production implementation is [`SqliteEngine`].

pub mod sqlite;

pub use sqlite::SqliteEngine;

use crate::value::SetMap;
use thiserror::Error as ThisError;

/// One result row: column name → value, in statement column order.
pub type Row = SetMap;

/// A failure reported by the underlying engine.
///
/// `code` is the driver's numeric error code; -1 when the failure has no
/// driver code (connection handling, row decoding).
#[derive(Debug, Clone, ThisError)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    /// Driver error code.
    pub code: i32,
    /// Driver error message.
    pub message: String,
}

impl EngineError {
    /// Builds an error with no driver code.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -1,
            message: message.into(),
        }
    }
}

/// A connection executing finished SQL text.
///
/// Statements arrive fully compiled with all values rendered as escaped
/// literals; implementations must not interpolate anything further.
pub trait SqlEngine: Send + Sync {
    /// Executes a statement returning rows.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when preparation or execution fails.
    fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError>;

    /// Executes a statement, returning the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when execution fails.
    fn execute(&self, sql: &str) -> Result<u64, EngineError>;

    /// Executes an insert statement, returning the generated row id.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when execution fails.
    fn insert(&self, sql: &str) -> Result<i64, EngineError>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the engine rejects the begin.
    fn begin(&self) -> Result<(), EngineError>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the commit fails.
    fn commit(&self) -> Result<(), EngineError>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the rollback fails.
    fn rollback(&self) -> Result<(), EngineError>;

    /// A stable identity for this connection, used in cache keys so that
    /// results from different databases never collide.
    fn identity(&self) -> String;
}
