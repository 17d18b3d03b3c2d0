//! # Activerow
//!
//! A lightweight active-record layer over `SQLite`.
//!
//! Activerow maps in-memory record instances to table rows through a
//! declared schema: each concrete record type names its table, fields,
//! per-field policies (insertable, updatable, selectable, mandatory,
//! unique), composite unique indexes, and primary key. The lifecycle
//! engine drives create/load/find/update/delete through validation,
//! uniqueness enforcement, and extension hooks, with nested operations
//! sharing a single transaction committed at the outermost level.
//!
//! ## Features
//!
//! - Declarative per-type schemas with defaults, visibility, and
//!   uniqueness policies
//! - A validating write lifecycle with override hooks at every decision
//!   point
//! - Nested-transaction bookkeeping scoped to a per-request [`Store`]
//! - A SQL gateway with table prefixing and an optional LRU result cache
//! - Injection-safe statement compilation via connection-rule escaping
//!
//! ## Example
//!
//! ```rust,ignore
//! use activerow::{Record, RecordType, Schema, SetMap, Store, StoreConfig};
//!
//! let store = Store::open(&StoreConfig::at_path("./app.db"))?;
//! let person = Record::<Person>::create(&store, SetMap::new().with("name", "Ann"))?;
//! let again = Record::<Person>::load(&store, person.id()?)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cache;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod value;

// Re-exports for convenience
pub use cache::{Cache, InMemoryCache};
pub use config::StoreConfig;
pub use engine::{EngineError, Row, SqlEngine, SqliteEngine};
pub use gateway::SqlGateway;
pub use query::{Filter, Limit, Predicate, QueryOptions, Sort, SortDirection};
pub use record::{Record, RecordType};
pub use schema::{FieldSpec, FieldType, Schema};
pub use store::Store;
pub use value::{SetMap, SqlKind, Value};

/// Error type for activerow operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `RecordNotFound` | Zero or multiple matches on a single-result query, or the row vanished on reload |
/// | `InsertForbidden` / `UpdateForbidden` / `DeleteForbidden` | The permission hook declines the operation |
/// | `InsertFailed` / `UpdateFailed` / `DeleteFailed` | The write executed but did not take effect |
/// | `FieldUnknown` | A set-map key is not in the schema (or is hidden and protected) |
/// | `FieldProtected` | A set-map key is visible but not writable for the operation |
/// | `MandatoryMissing` | A mandatory field is absent or empty |
/// | `UniqueFieldDuplicate` | A unique field or index already holds the value |
/// | `Engine` | The underlying SQL engine reported a failure |
/// | `InvalidQuery` | Caller misuse of the gateway (e.g. an empty write set) |
/// | `Schema` | A record-type authoring error (e.g. no id field declared) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// No unique record matched a single-result query.
    ///
    /// Ambiguity is treated as not-found: more than one match raises this
    /// too. Also raised when a record's row is gone on reload.
    #[error("{record} not found: {detail}")]
    RecordNotFound {
        /// The record type name.
        record: String,
        /// What was looked for.
        detail: String,
    },

    /// Creating a new record was declined by the permission hook.
    #[error("creating a new record is forbidden")]
    InsertForbidden,

    /// The insert did not take effect.
    #[error("insert failed")]
    InsertFailed,

    /// Updating the record was declined by the permission hook.
    #[error("updating the record is forbidden")]
    UpdateForbidden,

    /// The update did not take effect.
    #[error("update failed")]
    UpdateFailed,

    /// Deleting the record was declined by the permission hook.
    ///
    /// Also raised when an update sets `deleted = 1` without delete
    /// permission.
    #[error("deleting the record is forbidden")]
    DeleteForbidden,

    /// The delete did not take effect.
    #[error("delete failed")]
    DeleteFailed,

    /// A set-map key is not in the schema.
    ///
    /// Hidden write-protected fields also report as unknown so their
    /// existence is not revealed to callers.
    #[error("field {field} is unknown")]
    FieldUnknown {
        /// The offending field name.
        field: String,
    },

    /// A set-map key is declared but not writable for the operation.
    #[error("field {field} is protected")]
    FieldProtected {
        /// The offending field name.
        field: String,
    },

    /// A mandatory field is absent or empty.
    #[error("missing mandatory field {field}")]
    MandatoryMissing {
        /// The missing field name.
        field: String,
    },

    /// A unique field or composite unique index already holds the value.
    #[error("{fields} must be unique; record {existing_id} already holds the given value")]
    UniqueFieldDuplicate {
        /// The unique field, or the index members joined with ` & `.
        fields: String,
        /// Primary key of the conflicting record.
        existing_id: String,
    },

    /// The underlying SQL engine reported a failure.
    #[error("engine error {code}: {message}")]
    Engine {
        /// Driver error code.
        code: i32,
        /// Driver error message.
        message: String,
    },

    /// Caller misuse of the gateway, e.g. a write with an empty set map.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A record-type authoring error, e.g. loading by id on a schema with
    /// no id field.
    #[error("schema error: {0}")]
    Schema(String),
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Self::Engine {
            code: e.code,
            message: e.message,
        }
    }
}

/// Result type alias for activerow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Used for the last-update markers. Falls back to 0 if the system clock
/// is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RecordNotFound {
            record: "Person".to_string(),
            detail: "no unique match for id = 7".to_string(),
        };
        assert_eq!(err.to_string(), "Person not found: no unique match for id = 7");

        let err = Error::FieldUnknown {
            field: "nick".to_string(),
        };
        assert_eq!(err.to_string(), "field nick is unknown");

        let err = Error::UniqueFieldDuplicate {
            fields: "name".to_string(),
            existing_id: "3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "name must be unique; record 3 already holds the given value"
        );

        let err = Error::from(EngineError {
            code: 1,
            message: "no such table".to_string(),
        });
        assert_eq!(err.to_string(), "engine error 1: no such table");
    }

    #[test]
    fn test_current_timestamp() {
        assert!(current_timestamp() > 0);
    }
}
