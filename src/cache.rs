//! Result-cache collaborator.
//!
//! The engine never depends on the cache for correctness: a `get` may
//! return a stale value or nothing at all, and every miss falls through to
//! a live query. Values are plain JSON so any key/value store can sit
//! behind the trait.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

/// A key/value cache for query results and bookkeeping markers.
///
/// Implementations may evict or lose entries at any time.
pub trait Cache: Send + Sync {
    /// Looks up a cached value.
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Stores a value under the key, replacing any existing entry.
    fn set(&self, key: &str, value: serde_json::Value);
}

/// In-process LRU cache.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, serde_json::Value>>,
}

impl InMemoryCache {
    /// Creates a cache holding up to `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Acquires the entry lock, recovering from poisoning.
    ///
    /// A panic while holding the lock leaves the map structurally intact,
    /// so recovery is safe; losing cached entries is always acceptable.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, serde_json::Value>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("cache mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) {
        self.lock().put(key.to_string(), value);
    }
}

/// Derives a deterministic cache key from a namespace and payload.
///
/// The gateway namespaces keys with the engine identity and table prefix
/// and serializes the full argument list into the payload, so identical
/// queries against the same connection share a key and nothing else does.
#[must_use]
pub fn digest_key(namespace: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}
