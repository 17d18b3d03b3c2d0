//! Statement execution gateway.
//!
//! [`SqlGateway`] owns the engine handle and is the single point through
//! which compiled statements run. It applies the table prefix, wraps
//! driver failures into [`Error::Engine`], and consults the result cache
//! for reads when caching is enabled per-call or per-gateway. The cache is
//! never load-bearing: it is populated only after a successful query and a
//! miss always falls through to the engine.

use crate::cache::{Cache, digest_key};
use crate::engine::{Row, SqlEngine};
use crate::query::{self, Filter, Limit, QueryOptions, Sort};
use crate::value::SetMap;
use crate::{Error, Result};
use serde_json::json;

/// Executes compiled statements against the owned engine.
pub struct SqlGateway {
    engine: Box<dyn SqlEngine>,
    cache: Box<dyn Cache>,
    table_prefix: String,
    use_cache: bool,
}

impl SqlGateway {
    /// Creates a gateway with no table prefix and caching disabled by
    /// default.
    #[must_use]
    pub fn new(engine: Box<dyn SqlEngine>, cache: Box<dyn Cache>) -> Self {
        Self {
            engine,
            cache,
            table_prefix: String::new(),
            use_cache: false,
        }
    }

    /// The prefix prepended to every table name.
    #[must_use]
    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// Sets the table prefix.
    pub fn set_table_prefix(&mut self, prefix: impl Into<String>) {
        self.table_prefix = prefix.into();
    }

    /// Whether reads consult the cache when the call does not say
    /// otherwise.
    #[must_use]
    pub const fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Sets the gateway-level cache default.
    pub const fn set_use_cache(&mut self, use_cache: bool) {
        self.use_cache = use_cache;
    }

    /// The cache collaborator (also used for bookkeeping markers).
    #[must_use]
    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    fn prefixed(&self, table: &str, options: &QueryOptions) -> String {
        let prefix = options
            .table_prefix
            .as_deref()
            .unwrap_or(&self.table_prefix);
        format!("{prefix}{table}")
    }

    /// Runs a SELECT, optionally through the cache.
    ///
    /// An empty `fields` slice selects all columns. The cache is consulted
    /// only when `options.use_cache` (or the gateway default) says so, and
    /// is populated only after the query succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the underlying engine fails.
    pub fn select(
        &self,
        table: &str,
        fields: &[&str],
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<Limit>,
        options: &QueryOptions,
    ) -> Result<Vec<Row>> {
        let table = self.prefixed(table, options);
        let use_cache = options.use_cache.unwrap_or(self.use_cache);

        let cache_key = if use_cache {
            let key = self.cache_key(
                "select",
                &json!([table, fields, filter, sort, limit]).to_string(),
            );
            if let Some(cached) = self.cache.get(&key) {
                if let Ok(rows) = serde_json::from_value::<Vec<Row>>(cached) {
                    tracing::debug!(table = %table, "select served from cache");
                    return Ok(rows);
                }
            }
            Some(key)
        } else {
            None
        };

        let sql = query::build_select(&table, fields, filter, sort, limit);
        tracing::debug!(sql = %sql, "select");
        let rows = self.engine.query(&sql)?;

        if let Some(key) = cache_key {
            if let Ok(value) = serde_json::to_value(&rows) {
                self.cache.set(&key, value);
            }
        }

        Ok(rows)
    }

    /// Runs an INSERT, returning the generated row id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] when the set map is empty and
    /// [`Error::Engine`] when execution fails.
    pub fn insert(&self, table: &str, set_map: &SetMap, options: &QueryOptions) -> Result<i64> {
        if set_map.is_empty() {
            return Err(Error::InvalidQuery(
                "insert needs at least one field to set".to_string(),
            ));
        }

        let table = self.prefixed(table, options);
        let sql = query::build_insert(&table, set_map, options);
        tracing::debug!(sql = %sql, "insert");
        Ok(self.engine.insert(&sql)?)
    }

    /// Runs a `REPLACE INTO`, returning the generated row id.
    ///
    /// # Errors
    ///
    /// Same as [`SqlGateway::insert`].
    pub fn replace(&self, table: &str, set_map: &SetMap, options: &QueryOptions) -> Result<i64> {
        let options = options.clone().replacing();
        self.insert(table, set_map, &options)
    }

    /// Runs an UPDATE, returning the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] when the set map is empty and
    /// [`Error::Engine`] when execution fails.
    pub fn update(&self, table: &str, filter: &Filter, set_map: &SetMap) -> Result<u64> {
        if set_map.is_empty() {
            return Err(Error::InvalidQuery(
                "update needs at least one field to set".to_string(),
            ));
        }

        let table = self.prefixed(table, &QueryOptions::new());
        let sql = query::build_update(&table, filter, set_map);
        tracing::debug!(sql = %sql, "update");
        Ok(self.engine.execute(&sql)?)
    }

    /// Runs a DELETE, returning the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when execution fails.
    pub fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        let table = self.prefixed(table, &QueryOptions::new());
        let sql = query::build_delete(&table, filter);
        tracing::debug!(sql = %sql, "delete");
        Ok(self.engine.execute(&sql)?)
    }

    /// Opens a transaction on the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the engine rejects it.
    pub fn begin(&self) -> Result<()> {
        Ok(self.engine.begin()?)
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the commit fails.
    pub fn commit(&self) -> Result<()> {
        Ok(self.engine.commit()?)
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the rollback fails.
    pub fn rollback(&self) -> Result<()> {
        Ok(self.engine.rollback()?)
    }

    fn cache_key(&self, operation: &str, payload: &str) -> String {
        let namespace = format!("{} {}", self.engine.identity(), self.table_prefix);
        digest_key(&namespace, &format!("{operation} {payload}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::engine::{EngineError, SqliteEngine};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Engine wrapper that counts queries, for cache assertions.
    struct CountingEngine {
        inner: SqliteEngine,
        queries: Arc<AtomicUsize>,
    }

    impl SqlEngine for CountingEngine {
        fn query(&self, sql: &str) -> std::result::Result<Vec<Row>, EngineError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query(sql)
        }

        fn execute(&self, sql: &str) -> std::result::Result<u64, EngineError> {
            self.inner.execute(sql)
        }

        fn insert(&self, sql: &str) -> std::result::Result<i64, EngineError> {
            self.inner.insert(sql)
        }

        fn begin(&self) -> std::result::Result<(), EngineError> {
            self.inner.begin()
        }

        fn commit(&self) -> std::result::Result<(), EngineError> {
            self.inner.commit()
        }

        fn rollback(&self) -> std::result::Result<(), EngineError> {
            self.inner.rollback()
        }

        fn identity(&self) -> String {
            self.inner.identity()
        }
    }

    fn gateway() -> (SqlGateway, Arc<AtomicUsize>) {
        let engine = SqliteEngine::in_memory().unwrap();
        engine
            .execute("CREATE TABLE pre_person (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let counting = CountingEngine {
            inner: engine,
            queries: Arc::clone(&queries),
        };
        let mut gateway = SqlGateway::new(Box::new(counting), Box::new(InMemoryCache::new(16)));
        gateway.set_table_prefix("pre_");
        (gateway, queries)
    }

    #[test]
    fn insert_select_round_trip_with_prefix() {
        let (gateway, _) = gateway();
        let id = gateway
            .insert(
                "person",
                &SetMap::new().with("name", "Ann").with("age", 30),
                &QueryOptions::new(),
            )
            .unwrap();
        assert_eq!(id, 1);

        let rows = gateway
            .select(
                "person",
                &[],
                &Filter::new().eq("name", "Ann"),
                None,
                None,
                &QueryOptions::new(),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn empty_write_sets_are_rejected() {
        let (gateway, _) = gateway();
        let err = gateway
            .insert("person", &SetMap::new(), &QueryOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        let err = gateway
            .update("person", &Filter::new().eq("id", 1), &SetMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn update_and_delete_report_affected_rows() {
        let (gateway, _) = gateway();
        let opts = QueryOptions::new();
        gateway
            .insert("person", &SetMap::new().with("name", "Ann").with("age", 30), &opts)
            .unwrap();
        gateway
            .insert("person", &SetMap::new().with("name", "Bob").with("age", 30), &opts)
            .unwrap();

        let affected = gateway
            .update(
                "person",
                &Filter::new().eq("age", 30),
                &SetMap::new().with("age", 31),
            )
            .unwrap();
        assert_eq!(affected, 2);

        let affected = gateway
            .delete("person", &Filter::new().eq("name", "Ann"))
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn cached_select_skips_the_engine() {
        let (gateway, queries) = gateway();
        let opts = QueryOptions::new();
        gateway
            .insert("person", &SetMap::new().with("name", "Ann").with("age", 30), &opts)
            .unwrap();

        let cached = QueryOptions::new().cached(true);
        let filter = Filter::new().eq("name", "Ann");
        let first = gateway
            .select("person", &[], &filter, None, None, &cached)
            .unwrap();
        let second = gateway
            .select("person", &[], &filter, None, None, &cached)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(queries.load(Ordering::SeqCst), 1);

        // Bypassing the cache goes back to the engine.
        let bypass = QueryOptions::new().cached(false);
        gateway
            .select("person", &[], &filter, None, None, &bypass)
            .unwrap();
        assert_eq!(queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cache_is_not_populated_by_uncached_reads() {
        let (gateway, queries) = gateway();
        let opts = QueryOptions::new();
        gateway
            .insert("person", &SetMap::new().with("name", "Ann").with("age", 30), &opts)
            .unwrap();

        let filter = Filter::new().eq("name", "Ann");
        gateway
            .select("person", &[], &filter, None, None, &QueryOptions::new())
            .unwrap();
        gateway
            .select("person", &[], &filter, None, None, &QueryOptions::new())
            .unwrap();
        assert_eq!(queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn replace_overwrites_by_primary_key() {
        let (gateway, _) = gateway();
        let opts = QueryOptions::new();
        let id = gateway
            .insert("person", &SetMap::new().with("name", "Ann").with("age", 30), &opts)
            .unwrap();

        gateway
            .replace(
                "person",
                &SetMap::new().with("id", id).with("name", "Ann").with("age", 31),
                &opts,
            )
            .unwrap();

        let rows = gateway
            .select("person", &[], &Filter::new(), None, None, &opts)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&Value::Int(31)));
    }
}
