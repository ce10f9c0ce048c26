//! Query result caching.

use std::time::Duration;

use recipe_core::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ttl::TtlCache;

/// Prefix of every query cache key.
pub const CACHE_KEY_PREFIX: &str = "recipe:cache:";

/// Rows produced by a statement, as stored in a [`QueryCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A store for query results.
pub trait QueryCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedResult>;
    fn set(&self, key: &str, result: CachedResult);
    fn remove(&self, key: &str);
}

/// Keeps results in process memory until they expire.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: TtlCache<String, CachedResult>,
}

impl MemoryBackend {
    pub fn new(expiration: Duration) -> Self {
        Self {
            entries: TtlCache::fixed(expiration),
        }
    }
}

impl QueryCache for MemoryBackend {
    fn get(&self, key: &str) -> Option<CachedResult> {
        self.entries.get(key)
    }

    fn set(&self, key: &str, result: CachedResult) {
        self.entries.insert(key.to_string(), result);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Cache key for a statement and its bound parameters.
///
/// Parameters are hashed in position order, each tagged with its index, so
/// the same values bound to different placeholders give different keys.
pub fn query_cache_key(sql: &str, params: &[Value]) -> String {
    let mut h = Sha256::new();
    h.update(sql.as_bytes());
    for (i, param) in params.iter().enumerate() {
        h.update([0u8]);
        h.update(format!("{}={}", i + 1, tagged(param)).as_bytes());
    }
    format!("{CACHE_KEY_PREFIX}{:x}", h.finalize())
}

fn tagged(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Integer(n) => format!("i:{n}"),
        Value::Real(f) => format!("r:{f}"),
        Value::Text(s) => format!("t:{s}"),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    fn result() -> CachedResult {
        CachedResult {
            columns: vec!["state".into()],
            rows: vec![vec![Value::from("Vermont")]],
        }
    }

    #[test]
    fn keys_depend_on_sql_and_params() {
        let key = query_cache_key("SELECT 1", &[]);
        assert!(key.starts_with("recipe:cache:"));
        assert_eq!(key, query_cache_key("SELECT 1", &[]));
        assert!(key != query_cache_key("SELECT 2", &[]));

        let one = query_cache_key("SELECT ?", &[Value::Integer(1)]);
        assert!(one != query_cache_key("SELECT ?", &[Value::from("1")]));
        assert!(
            query_cache_key("SELECT ?, ?", &[Value::Integer(1), Value::Integer(2)])
                != query_cache_key("SELECT ?, ?", &[Value::Integer(2), Value::Integer(1)])
        );
    }

    #[test]
    fn memory_backend_stores_and_forgets() {
        let cache = MemoryBackend::new(Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
        cache.set("k", result());
        assert_eq!(cache.get("k"), Some(result()));
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn memory_backend_expires() {
        let cache = MemoryBackend::new(Duration::from_millis(20));
        cache.set("k", result());
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
    }
}
