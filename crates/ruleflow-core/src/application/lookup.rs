use dashmap::DashMap;
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::repository::{ReferenceTableRepository, Row};
use crate::CoreError;

/// Lookup configuration
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Bound on a single repository read
    pub timeout: Duration,
    /// Most cached rows kept; the least recently used one is evicted first
    pub cache_capacity: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            cache_capacity: 1000,
        }
    }
}

/// Result of a keyed read; absence is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// The row stored under the key
    Found(Row),
    /// No row for the key
    NotFound,
}

impl LookupResult {
    /// Whether a row was found
    pub fn is_found(&self) -> bool {
        matches!(self, LookupResult::Found(_))
    }

    /// Column of the found row
    pub fn column(&self, column: &str) -> Option<&Value> {
        match self {
            LookupResult::Found(row) => row.get(column).filter(|v| !v.is_null()),
            LookupResult::NotFound => None,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached keys
    pub entries: usize,
    /// Reads served from cache
    pub hits: u64,
    /// Reads that went to the repository
    pub misses: u64,
}

type CacheKey = (String, String);

/// Reference table lookups with a bounded timeout and a bounded LRU cache
pub struct LookupService {
    repository: Arc<dyn ReferenceTableRepository>,
    config: LookupConfig,
    cache: std::sync::Mutex<LruCache<CacheKey, LookupResult>>,
    key_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupService {
    /// Create a lookup service over a repository
    pub fn new(repository: Arc<dyn ReferenceTableRepository>, config: LookupConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            repository,
            config,
            cache: std::sync::Mutex::new(LruCache::new(capacity)),
            key_locks: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Read the row of `table` keyed by `key`
    ///
    /// Concurrent reads of the same key are serialized so that only one
    /// reaches the repository. Reads of different keys do not wait on each
    /// other. A key lock lives only while someone holds or awaits it.
    pub async fn lookup(&self, table: &str, key: &str) -> Result<LookupResult, CoreError> {
        let cache_key = (table.to_string(), key.to_string());
        if let Some(hit) = self.cached(&cache_key) {
            return Ok(hit);
        }

        let lock = self
            .key_locks
            .entry(cache_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let result = match self.cached(&cache_key) {
            Some(hit) => Ok(hit),
            None => self.load(cache_key.clone(), table, key).await,
        };

        let released = Arc::as_ptr(&lock);
        drop(guard);
        drop(lock);
        // Only the map still refers to the lock once every reader is done
        self.key_locks
            .remove_if(&cache_key, |_, held| Arc::as_ptr(held) == released && Arc::strong_count(held) == 1);
        result
    }

    async fn load(&self, cache_key: CacheKey, table: &str, key: &str) -> Result<LookupResult, CoreError> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let read = tokio::time::timeout(self.config.timeout, self.repository.find_row(table, key)).await;
        let row = match read {
            Ok(result) => result?,
            Err(_) => {
                warn!(table = %table, key = %key, timeout_ms = self.config.timeout.as_millis() as u64, "Reference lookup timed out");
                return Err(CoreError::TimeoutError(format!(
                    "Lookup of '{}' in table '{}' exceeded {}ms",
                    key,
                    table,
                    self.config.timeout.as_millis()
                )));
            }
        };

        let result = match row {
            Some(row) => LookupResult::Found(row),
            None => LookupResult::NotFound,
        };
        debug!(table = %table, key = %key, found = result.is_found(), "Reference lookup");
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(cache_key, result.clone());
        Ok(result)
    }

    /// Read a single column; `None` when the row or the column is missing
    pub async fn value(&self, table: &str, key: &str, column: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.lookup(table, key).await?.column(column).cloned())
    }

    /// Whether a table is registered
    pub async fn table_exists(&self, table: &str) -> Result<bool, CoreError> {
        tokio::time::timeout(self.config.timeout, self.repository.table_exists(table))
            .await
            .map_err(|_| CoreError::TimeoutError(format!("Checking table '{}' timed out", table)))?
    }

    /// Names of registered tables
    pub async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        tokio::time::timeout(self.config.timeout, self.repository.list_tables())
            .await
            .map_err(|_| CoreError::TimeoutError("Listing tables timed out".to_string()))?
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.lock().unwrap_or_else(PoisonError::into_inner).len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached row
    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.key_locks.clear();
    }

    fn cached(&self, key: &CacheKey) -> Option<LookupResult> {
        let hit = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::repository::memory::MemoryReferenceTableRepository;
    use async_trait::async_trait;
    use serde_json::json;

    fn service() -> LookupService {
        let repo = MemoryReferenceTableRepository::new();
        repo.put_row("tax_rates", "ON", json!({"hst": 0.13}).as_object().cloned().unwrap());
        LookupService::new(Arc::new(repo), LookupConfig::default())
    }

    #[tokio::test]
    async fn test_cache_hits_and_misses() {
        let lookups = service();

        assert!(lookups.lookup("tax_rates", "ON").await.unwrap().is_found());
        assert!(lookups.lookup("tax_rates", "ON").await.unwrap().is_found());
        assert_eq!(lookups.lookup("tax_rates", "ZZ").await.unwrap(), LookupResult::NotFound);

        let stats = lookups.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);

        lookups.clear();
        assert_eq!(lookups.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_cache_is_bounded_by_capacity() {
        let repo = MemoryReferenceTableRepository::new();
        repo.put_row("tax_rates", "ON", json!({"hst": 0.13}).as_object().cloned().unwrap());
        let lookups = LookupService::new(
            Arc::new(repo),
            LookupConfig {
                cache_capacity: 16,
                ..Default::default()
            },
        );

        for i in 0..500 {
            let key = format!("unknown-{}", i);
            assert_eq!(lookups.lookup("tax_rates", &key).await.unwrap(), LookupResult::NotFound);
        }

        let stats = lookups.stats();
        assert_eq!(stats.entries, 16);
        assert_eq!(stats.misses, 500);
        assert!(lookups.key_locks.is_empty());

        // Evicted keys are read again
        lookups.lookup("tax_rates", "unknown-0").await.unwrap();
        assert_eq!(lookups.stats().misses, 501);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_load() {
        let lookups = Arc::new(service());
        let reads = (0..8).map(|_| {
            let lookups = Arc::clone(&lookups);
            tokio::spawn(async move { lookups.lookup("tax_rates", "ON").await })
        });
        for read in futures::future::join_all(reads).await {
            assert!(read.unwrap().unwrap().is_found());
        }

        let stats = lookups.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
        assert!(lookups.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_is_lookup_error() {
        let lookups = service();
        let err = lookups.lookup("nope", "ON").await.unwrap_err();
        assert!(matches!(err, CoreError::LookupError(_)));
    }

    struct SlowRepository;

    #[async_trait]
    impl ReferenceTableRepository for SlowRepository {
        async fn find_row(&self, _table: &str, _key: &str) -> Result<Option<Row>, CoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn table_exists(&self, _table: &str) -> Result<bool, CoreError> {
            Ok(true)
        }

        async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_slow_repository_times_out() {
        let lookups = LookupService::new(
            Arc::new(SlowRepository),
            LookupConfig {
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let err = lookups.lookup("t", "k").await.unwrap_err();
        assert!(matches!(err, CoreError::TimeoutError(_)));
        assert_eq!(lookups.stats().entries, 0);
    }
}
