//! Store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_cache_capacity() -> usize {
    256
}

/// Configuration for opening a [`Store`](crate::store::Store).
///
/// All fields have defaults so a config deserialized from a partial
/// document (or built with `StoreConfig::default()`) is usable as-is:
/// an in-memory database, no table prefix, caching off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file location; `None` opens a private in-memory database.
    pub db_path: Option<PathBuf>,
    /// Prefix prepended to every table name.
    pub table_prefix: String,
    /// Whether reads consult the result cache by default.
    pub use_cache: bool,
    /// Result-cache capacity in entries.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            table_prefix: String::new(),
            use_cache: false,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl StoreConfig {
    /// Config for an in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Config for a file-backed database.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Enables or disables the result cache by default.
    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_without_cache() {
        let config = StoreConfig::default();
        assert!(config.db_path.is_none());
        assert!(config.table_prefix.is_empty());
        assert!(!config.use_cache);
        assert_eq!(config.cache_capacity, 256);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"table_prefix": "app_", "use_cache": true}"#).unwrap();
        assert_eq!(config.table_prefix, "app_");
        assert!(config.use_cache);
        assert_eq!(config.cache_capacity, 256);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn builder_helpers() {
        let config = StoreConfig::at_path("/tmp/app.db")
            .with_table_prefix("app_")
            .with_cache(true);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/app.db")));
        assert_eq!(config.table_prefix, "app_");
        assert!(config.use_cache);
    }
}
