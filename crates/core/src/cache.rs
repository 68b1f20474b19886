//! In-memory TTL cache for query payloads.
//!
//! Entries are `{value, stored_at}` pairs keyed by [`CacheKey`]. Expiry is
//! checked lazily on read: an entry is valid iff `now - stored_at < ttl`, and
//! an expired entry is removed by the read that finds it. There is no
//! background eviction task.
//!
//! Each entry also records the invalidation signal it was stored under, so a
//! reader can tell a TTL-valid value that predates the latest bump. Entries
//! stored through plain [`TtlCache::set`] count as stored under signal 0.
//!
//! Time comes from `tokio::time::Instant`, so a paused test clock drives
//! expiry.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::Error;
use crate::key::{CacheKey, QueryDescriptor, cache_key};

/// TTL for volatile metrics (5 minutes).
pub const SHORT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for slowly-changing reference lists (30 minutes).
pub const LONG_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    signal: u64,
}

/// A live cached value and the invalidation signal it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached {
    pub value: Value,
    pub signal: u64,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// In-memory cache with a fixed TTL.
///
/// Shared between coordinators behind an `Arc`; writes are last-write-wins.
#[derive(Debug)]
pub struct TtlCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a stored value if it has not expired.
    ///
    /// An expired entry is removed before returning `None`.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.get_entry(key).map(|cached| cached.value)
    }

    /// Like [`TtlCache::get`], but also returns the entry's signal.
    pub fn get_entry(&self, key: &CacheKey) -> Option<Cached> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_valid(self.ttl) => {
                    tracing::debug!(key = %key.fingerprint(), "cache hit");
                    return Some(Cached { value: entry.value.clone(), signal: entry.signal });
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        // Re-check: a writer may have refreshed the entry between the locks.
        if let Some(entry) = entries.get(key)
            && entry.is_valid(self.ttl)
        {
            return Some(Cached { value: entry.value.clone(), signal: entry.signal });
        }
        entries.remove(key);
        tracing::debug!(key = %key.fingerprint(), "cache entry expired");
        None
    }

    /// Store a value, replacing any prior entry.
    pub fn set(&self, key: CacheKey, value: Value) {
        self.set_with_signal(key, value, 0);
    }

    /// Store a value tagged with the invalidation signal it was read under.
    pub fn set_with_signal(&self, key: CacheKey, value: Value, signal: u64) {
        tracing::debug!(key = %key.fingerprint(), signal, "cache store");
        self.entries.write().insert(key, CacheEntry { value, stored_at: Instant::now(), signal });
    }

    /// Remove a single entry. No-op if absent.
    pub fn invalidate(&self, key: &CacheKey) {
        if self.entries.write().remove(key).is_some() {
            tracing::debug!(key = %key.fingerprint(), "cache entry invalidated");
        }
    }

    /// Remove every entry for an endpoint, whatever its params.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.endpoint() != endpoint);
        before - entries.len()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(self.ttl));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until read or purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Lookup by descriptor.
    pub fn get_query(&self, descriptor: &QueryDescriptor) -> Option<Value> {
        self.get(&descriptor.cache_key())
    }

    /// Store by descriptor.
    pub fn set_query(&self, descriptor: &QueryDescriptor, value: Value) {
        self.set(descriptor.cache_key(), value);
    }

    /// Invalidate by descriptor.
    pub fn invalidate_query(&self, descriptor: &QueryDescriptor) {
        self.invalidate(&descriptor.cache_key());
    }

    /// Lookup by endpoint and raw params.
    pub fn get_params<P: Serialize + ?Sized>(&self, endpoint: &str, params: &P) -> Result<Option<Value>, Error> {
        Ok(self.get(&cache_key(endpoint, params)?))
    }

    /// Store by endpoint and raw params.
    pub fn set_params<P: Serialize + ?Sized>(&self, endpoint: &str, params: &P, value: Value) -> Result<(), Error> {
        self.set(cache_key(endpoint, params)?, value);
        Ok(())
    }

    pub fn invalidate_params<P: Serialize + ?Sized>(&self, endpoint: &str, params: &P) -> Result<(), Error> {
        self.invalidate(&cache_key(endpoint, params)?);
        Ok(())
    }
}
