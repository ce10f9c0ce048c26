//! A small thread-safe cache whose entries expire.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Maps keys to values that expire `ttl` after they were stored.
///
/// A refreshing cache restarts an entry's clock every time it is read, so
/// entries in regular use never expire.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    refresh_on_access: bool,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// A cache whose entries expire `ttl` after their last access.
    pub fn refreshing(ttl: Duration) -> Self {
        Self {
            ttl,
            refresh_on_access: true,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache whose entries expire `ttl` after they were inserted.
    pub fn fixed(ttl: Duration) -> Self {
        Self {
            refresh_on_access: false,
            ..Self::refreshing(ttl)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a clone of the live value for `key`, evicting it if expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries();
        let now = Instant::now();
        let expired = match entries.get_mut(key) {
            None => return None,
            Some((value, stamp)) => {
                if now.duration_since(*stamp) < self.ttl {
                    if self.refresh_on_access {
                        *stamp = now;
                    }
                    return Some(value.clone());
                }
                true
            }
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    /// Stores `value`, evicting every expired entry first.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries();
        let now = Instant::now();
        self.evict_expired(&mut entries, now);
        entries.insert(key, (value, now));
    }

    fn evict_expired(&self, entries: &mut HashMap<K, (V, Instant)>, now: Instant) {
        entries.retain(|_, (_, stamp)| now.duration_since(*stamp) < self.ttl);
    }

    /// Returns the cached value for `key`, or stores the result of `make`.
    ///
    /// The cache stays locked while `make` runs, so concurrent callers for
    /// the same key build the value once.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        make: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let mut entries = self.entries();
        let now = Instant::now();
        if let Some((value, stamp)) = entries.get_mut(&key) {
            if now.duration_since(*stamp) < self.ttl {
                if self.refresh_on_access {
                    *stamp = now;
                }
                return Ok(value.clone());
            }
        }
        let value = make()?;
        self.evict_expired(&mut entries, now);
        entries.insert(key, (value.clone(), now));
        Ok(value)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries().remove(key).map(|(value, _)| value)
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, including ones that have expired since the
    /// last insert.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
