//! The unit-of-work context.
//!
//! A [`Store`] bundles the gateway with the transaction counter for one
//! logical request. Nested record operations against the same store share
//! a single underlying transaction: the engine transaction opens on the
//! 0→1 depth transition and commits on the 1→0 transition, so only the
//! outermost operation's commit is real. A rollback unconditionally resets
//! the depth to zero.
//!
//! The counter is interior-mutable (`Cell`), which makes `Store`
//! deliberately `!Sync`: one unit of work cannot be shared across threads,
//! so concurrent requests each carry their own store and cannot bleed into
//! each other's transactions.

use crate::cache::InMemoryCache;
use crate::config::StoreConfig;
use crate::engine::SqliteEngine;
use crate::gateway::SqlGateway;
use crate::{Result, current_timestamp};
use std::cell::Cell;

/// Per-request context: gateway plus transaction bookkeeping.
pub struct Store {
    gateway: SqlGateway,
    txn_depth: Cell<u32>,
}

impl Store {
    /// Wraps an existing gateway.
    #[must_use]
    pub const fn new(gateway: SqlGateway) -> Self {
        Self {
            gateway,
            txn_depth: Cell::new(0),
        }
    }

    /// Opens a store from configuration: a `SQLite` engine (file-backed or
    /// in-memory), an LRU result cache, and the configured prefix and
    /// cache default.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let engine = match &config.db_path {
            Some(path) => SqliteEngine::open(path)?,
            None => SqliteEngine::in_memory()?,
        };
        let cache = InMemoryCache::new(config.cache_capacity);
        let mut gateway = SqlGateway::new(Box::new(engine), Box::new(cache));
        gateway.set_table_prefix(config.table_prefix.clone());
        gateway.set_use_cache(config.use_cache);
        Ok(Self::new(gateway))
    }

    /// The gateway this store executes through.
    #[must_use]
    pub const fn gateway(&self) -> &SqlGateway {
        &self.gateway
    }

    /// Current transaction nesting depth.
    #[must_use]
    pub fn transaction_depth(&self) -> u32 {
        self.txn_depth.get()
    }

    /// Enters a (possibly nested) transaction.
    ///
    /// Opens the engine transaction only on the 0→1 transition; inner
    /// entries just increment the depth.
    pub(crate) fn begin_work(&self) -> Result<()> {
        if self.txn_depth.get() == 0 {
            self.gateway.begin()?;
        }
        self.txn_depth.set(self.txn_depth.get() + 1);
        Ok(())
    }

    /// Returns true when exactly one transaction level is open, i.e. the
    /// next commit closes the engine transaction.
    pub(crate) fn is_outermost(&self) -> bool {
        self.txn_depth.get() == 1
    }

    /// Leaves one transaction level, committing the engine transaction on
    /// the 1→0 transition.
    pub(crate) fn commit_work(&self) -> Result<()> {
        let depth = self.txn_depth.get().saturating_sub(1);
        self.txn_depth.set(depth);
        if depth == 0 {
            self.gateway.commit()?;
        }
        Ok(())
    }

    /// Abandons the whole nest: rolls back the engine transaction when one
    /// is open and resets the depth to zero regardless.
    ///
    /// Rollback failures are logged, not raised; the caller is already
    /// propagating the original error.
    pub(crate) fn rollback_work(&self) {
        if self.txn_depth.get() > 0 {
            if let Err(e) = self.gateway.rollback() {
                tracing::warn!(error = %e, "transaction rollback failed");
            }
        }
        self.txn_depth.set(0);
    }

    /// Reads the last-update marker for a record type, initializing it to
    /// "now" when the cache has no entry.
    #[must_use]
    pub fn last_update(&self, type_name: &str) -> u64 {
        let key = marker_key(type_name);
        if let Some(value) = self.gateway.cache().get(&key) {
            if let Some(ts) = value.as_u64() {
                return ts;
            }
        }
        let now = current_timestamp();
        self.gateway.cache().set(&key, serde_json::json!(now));
        now
    }

    /// Stamps the last-update marker for a record type.
    pub fn mark_updated(&self, type_name: &str) {
        self.gateway
            .cache()
            .set(&marker_key(type_name), serde_json::json!(current_timestamp()));
    }
}

fn marker_key(type_name: &str) -> String {
    format!("{type_name}_latest_update")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqlEngine;

    fn store() -> Store {
        let engine = SqliteEngine::in_memory().unwrap();
        engine
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        let gateway = SqlGateway::new(Box::new(engine), Box::new(InMemoryCache::new(16)));
        Store::new(gateway)
    }

    #[test]
    fn depth_transitions_drive_the_engine_transaction() {
        let store = store();
        assert_eq!(store.transaction_depth(), 0);

        store.begin_work().unwrap();
        assert_eq!(store.transaction_depth(), 1);
        assert!(store.is_outermost());

        store.begin_work().unwrap();
        assert_eq!(store.transaction_depth(), 2);
        assert!(!store.is_outermost());

        store.commit_work().unwrap();
        assert_eq!(store.transaction_depth(), 1);
        store.commit_work().unwrap();
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn rollback_resets_depth_from_any_level() {
        let store = store();
        store.begin_work().unwrap();
        store.begin_work().unwrap();
        store.begin_work().unwrap();

        store.rollback_work();
        assert_eq!(store.transaction_depth(), 0);

        // A second rollback with no open transaction is harmless.
        store.rollback_work();
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn nested_work_commits_once() {
        let store = store();
        store.begin_work().unwrap();
        store
            .gateway()
            .insert(
                "t",
                &crate::value::SetMap::new().with("v", "outer"),
                &crate::query::QueryOptions::new(),
            )
            .unwrap();

        store.begin_work().unwrap();
        store
            .gateway()
            .insert(
                "t",
                &crate::value::SetMap::new().with("v", "inner"),
                &crate::query::QueryOptions::new(),
            )
            .unwrap();
        store.commit_work().unwrap();

        // Still inside the outer transaction.
        assert_eq!(store.transaction_depth(), 1);
        store.commit_work().unwrap();

        let rows = store
            .gateway()
            .select(
                "t",
                &[],
                &crate::query::Filter::new(),
                None,
                None,
                &crate::query::QueryOptions::new(),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn open_from_config() {
        let store = Store::open(&StoreConfig::in_memory().with_table_prefix("app_")).unwrap();
        assert_eq!(store.gateway().table_prefix(), "app_");
        assert_eq!(store.transaction_depth(), 0);
    }

    #[test]
    fn last_update_marker_initializes_and_advances() {
        let store = store();
        let first = store.last_update("Person");
        assert!(first > 0);
        // The initialized value is now cached.
        assert_eq!(store.last_update("Person"), first);

        store.mark_updated("Person");
        assert!(store.last_update("Person") >= first);
    }
}
