//! Memoizing cache with bounded TTL
//!
//! Content-addressed, one file per key under a configured directory.
//! Every expensive stage of the engine (feature preparation, training,
//! prediction) funnels through [`CacheManager::get_or_compute`].
//!
//! IO failures degrade to "always recompute": a read error is a miss, a
//! write error is logged and reported as `false`. Nothing here is fatal.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;

/// One persisted cache entry. The payload is opaque JSON; the TTL is
/// recorded per entry so individual writes can override the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created_at: DateTime<Utc>,
    pub ttl_hours: u64,
    pub payload: serde_json::Value,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Duration::hours(self.ttl_hours as i64)
    }
}

/// Hit/miss accounting. Expired entries count as both expired and missed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub total_requests: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

/// File-backed memoization manager.
///
/// Provides no mutual exclusion: concurrent cold calls for the same key
/// may each run the underlying computation before either result lands in
/// the cache. Callers needing strict compute-once semantics must wrap
/// their call in an external per-key lock.
pub struct CacheManager {
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl CacheManager {
    /// Construction never fails: if the cache directory cannot be
    /// created, caching is disabled for this instance and a warning is
    /// logged.
    pub fn new(config: CacheConfig) -> Self {
        let mut config = config;
        if config.enabled {
            if let Err(e) = fs::create_dir_all(&config.dir) {
                warn!(dir = %config.dir.display(), error = %e, "cache directory unavailable, disabling cache");
                config.enabled = false;
            }
        }
        Self {
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Deterministic key for a call identity plus its arguments.
    ///
    /// Keyword arguments are sorted by name, so `[("b", ..), ("a", ..)]`
    /// and `[("a", ..), ("b", ..)]` map to the same key. Values are hashed
    /// exactly as given: semantically equal but differently formatted
    /// arguments (e.g. `"1.0"` vs `"1"`) produce distinct keys, so callers
    /// must stringify consistently.
    pub fn generate_key(&self, identity: &str, args: &[&str], kwargs: &[(&str, &str)]) -> String {
        let mut sorted: Vec<(&str, &str)> = kwargs.to_vec();
        sorted.sort_by_key(|(name, _)| *name);

        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        for arg in args {
            hasher.update([0u8]);
            hasher.update(arg.as_bytes());
        }
        for (name, value) in sorted {
            hasher.update([1u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Fetch a still-valid entry. An entry past its TTL is deleted and
    /// counted as expired, never returned.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        self.stats.lock().total_requests += 1;

        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.stats.lock().misses += 1;
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "unreadable cache entry, removing");
                let _ = fs::remove_file(&path);
                self.stats.lock().misses += 1;
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            let _ = fs::remove_file(&path);
            let mut stats = self.stats.lock();
            stats.expired += 1;
            stats.misses += 1;
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                self.stats.lock().hits += 1;
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "cache payload type mismatch, removing");
                let _ = fs::remove_file(&path);
                self.stats.lock().misses += 1;
                None
            }
        }
    }

    /// Best-effort persist under the default TTL. A no-op when caching is
    /// disabled; returns whether the entry was written.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        self.set_with_ttl(key, value, self.config.ttl_hours)
    }

    /// Best-effort persist with a per-entry TTL override.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_hours: u64) -> bool {
        if !self.config.enabled {
            return false;
        }

        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache payload");
                return false;
            }
        };
        let entry = CacheEntry {
            created_at: Utc::now(),
            ttl_hours,
            payload,
        };

        let path = self.entry_path(key);
        match serde_json::to_vec(&entry).map_err(std::io::Error::other).and_then(|bytes| fs::write(&path, bytes)) {
            Ok(()) => {
                debug!(key, "cache entry written");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "failed to write cache entry");
                false
            }
        }
    }

    /// Memoized call: identical arguments within the TTL window
    /// short-circuit the computation. At most one computation per
    /// (identity, arguments) per TTL window only when calls are
    /// serialized; see the type-level note on mutual exclusion.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(cached) = self.get::<T>(key) {
            return Ok(cached);
        }
        let value = compute()?;
        self.set(key, &value);
        Ok(value)
    }

    /// Remove a single entry. Returns whether anything was deleted.
    pub fn invalidate(&self, key: &str) -> bool {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "cache entry invalidated");
                true
            }
            Err(_) => false,
        }
    }

    /// Sweep every stale or unreadable entry. Returns the removal count.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0usize;
        for path in self.entry_files() {
            let stale = match fs::read(&path).ok().and_then(|raw| serde_json::from_slice::<CacheEntry>(&raw).ok()) {
                Some(entry) => entry.is_expired(now),
                None => true,
            };
            if stale && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "expired cache entries removed");
        }
        removed
    }

    /// Wipe every entry, valid or not.
    pub fn clear_all(&self) -> bool {
        let mut ok = true;
        for path in self.entry_files() {
            if fs::remove_file(&path).is_err() {
                ok = false;
            }
        }
        ok
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.config.dir.join(format!("{key}.cache"))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.config.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "cache") {
                    files.push(path);
                }
            }
        }
        files
    }
}
