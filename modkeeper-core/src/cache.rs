//! Time-boxed cache for the enabled-set
//!
//! The registry reads the persisted enabled-set through a [`CacheProvider`]
//! when caching is enabled and evicts the key after every mutation. The cache
//! is never authoritative: the file on disk is.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ModuleError;

/// Cache key under which the registry stores the enabled-set
pub const ENABLED_MODULES_KEY: &str = "modkeeper.enabled_modules";

/// Loader invoked on a cache miss
pub type Compute<'a> = &'a mut dyn FnMut() -> Result<Vec<String>, ModuleError>;

/// A get-or-compute cache with explicit invalidation
///
/// Implementations shared between processes (a host's cache backend) see
/// writes from other processes only after those processes evict the key.
pub trait CacheProvider: Send + Sync {
    /// Return the cached value for `key`, or compute, store and return it
    fn get_or_compute(
        &self,
        key: &str,
        ttl: Duration,
        compute: Compute<'_>,
    ) -> Result<Vec<String>, ModuleError>;

    /// Evict `key`
    fn forget(&self, key: &str);
}

struct CachedEntry {
    stored_at: Instant,
    ttl: Duration,
    value: Vec<String>,
}

/// In-process cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .map(|entry| entry.stored_at.elapsed() <= entry.ttl)
            .unwrap_or(false)
    }
}

impl CacheProvider for MemoryCache {
    fn get_or_compute(
        &self,
        key: &str,
        ttl: Duration,
        compute: Compute<'_>,
    ) -> Result<Vec<String>, ModuleError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = entries.get(key) {
            let age = entry.stored_at.elapsed();
            if age <= entry.ttl {
                tracing::debug!("Cache hit for {} (age: {:?})", key, age);
                return Ok(entry.value.clone());
            }
            tracing::debug!("Cache expired for {} (age: {:?})", key, age);
        }

        let value = compute()?;
        entries.insert(
            key.to_string(),
            CachedEntry {
                stored_at: Instant::now(),
                ttl,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    fn forget(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            tracing::debug!("Evicted cache key {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_skips_compute() {
        let cache = MemoryCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_compute("k", Duration::from_secs(60), &mut || {
                    calls += 1;
                    Ok(vec!["Blog".to_string()])
                })
                .unwrap();
            assert_eq!(value, vec!["Blog".to_string()]);
        }

        assert_eq!(calls, 1);
        assert!(cache.contains("k"));
    }

    #[test]
    fn test_forget_forces_recompute() {
        let cache = MemoryCache::new();
        cache
            .get_or_compute("k", Duration::from_secs(60), &mut || Ok(vec!["A".to_string()]))
            .unwrap();

        cache.forget("k");
        assert!(!cache.contains("k"));

        let value = cache
            .get_or_compute("k", Duration::from_secs(60), &mut || Ok(vec!["B".to_string()]))
            .unwrap();
        assert_eq!(value, vec!["B".to_string()]);
    }

    #[test]
    fn test_zero_ttl_expires() {
        let cache = MemoryCache::new();
        cache
            .get_or_compute("k", Duration::ZERO, &mut || Ok(vec!["A".to_string()]))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let value = cache
            .get_or_compute("k", Duration::ZERO, &mut || Ok(vec!["B".to_string()]))
            .unwrap();
        assert_eq!(value, vec!["B".to_string()]);
    }

    #[test]
    fn test_compute_error_is_not_cached() {
        let cache = MemoryCache::new();
        let result = cache.get_or_compute("k", Duration::from_secs(60), &mut || {
            Err(ModuleError::NotFound("x".to_string()))
        });
        assert!(result.is_err());
        assert!(!cache.contains("k"));
    }
}
