//! Cached country database with hot reload support.
//!
//! This module provides a lookup front-end with:
//! - LRU cache for lookup results
//! - Atomic hot reload for swapping in a newly published database
//! - Thread-safe concurrent access

use arc_swap::ArcSwap;
use quick_cache::sync::Cache;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::country::CountryCode;
use crate::reader::CountryDb;
use crate::Result;

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Configuration for the cached reader.
#[derive(Debug, Clone)]
pub struct CachedReaderConfig {
    /// Maximum number of entries in the cache.
    pub cache_capacity: usize,
    /// Whether to enable caching.
    pub cache_enabled: bool,
}

impl Default for CachedReaderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_enabled: true,
        }
    }
}

impl CachedReaderConfig {
    /// Create a new configuration with the specified cache capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache_capacity: capacity,
            cache_enabled: true,
        }
    }

    /// Create a configuration with caching disabled.
    pub fn no_cache() -> Self {
        Self {
            cache_capacity: 0,
            cache_enabled: false,
        }
    }
}

/// Country database with a result cache and hot reload.
///
/// # Example
///
/// ```ignore
/// use geobisect::CachedCountryDb;
/// use std::path::Path;
///
/// let db = CachedCountryDb::open(Path::new("/var/lib/geoip/dbip"))?;
/// let country = db.lookup("1.1.1.1".parse()?);
///
/// // Swap in a newer build without interrupting lookups
/// db.reload(Path::new("/var/lib/geoip/dbip-next"))?;
/// ```
pub struct CachedCountryDb {
    inner: ArcSwap<CountryDb>,
    /// Results tagged with the generation they were computed in
    cache: Option<Cache<IpAddr, (u64, Option<CountryCode>)>>,
    config: CachedReaderConfig,
    /// Incremented on every reload.
    generation: AtomicU64,
}

impl CachedCountryDb {
    /// Open `<prefix>.v4` / `<prefix>.v6` with default configuration.
    pub fn open(prefix: &Path) -> Result<Self> {
        Self::open_with_config(prefix, CachedReaderConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config(prefix: &Path, config: CachedReaderConfig) -> Result<Self> {
        Ok(Self::with_config(CountryDb::open(prefix)?, config))
    }

    /// Wrap an already opened database.
    pub fn with_config(db: CountryDb, config: CachedReaderConfig) -> Self {
        let cache = if config.cache_enabled && config.cache_capacity > 0 {
            Some(Cache::new(config.cache_capacity))
        } else {
            None
        };

        Self {
            inner: ArcSwap::from_pointee(db),
            cache,
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// Hot reload from a new prefix.
    ///
    /// In-flight lookups finish against the old database; new lookups see
    /// the new one.
    pub fn reload(&self, prefix: &Path) -> Result<()> {
        let db = CountryDb::open(prefix)?;
        self.swap(db);
        log::info!("Hot reloaded country database from {:?}", prefix);
        Ok(())
    }

    /// Hot reload from an already opened database.
    pub fn reload_from(&self, db: CountryDb) {
        self.swap(db);
        log::info!("Hot reloaded country database");
    }

    fn swap(&self, db: CountryDb) {
        // Store before bumping: a reader that sees the new generation also
        // sees the new database.
        self.inner.store(Arc::new(db));
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }

    /// Look up an address, consulting the cache first.
    ///
    /// Cached answers from before the latest reload are never served, even
    /// if a lookup racing the reload inserted them after the cache was
    /// cleared.
    pub fn lookup(&self, addr: IpAddr) -> Option<CountryCode> {
        let generation = self.generation();

        if let Some(ref cache) = self.cache {
            if let Some((tag, result)) = cache.get(&addr) {
                if tag == generation {
                    return result;
                }
            }
        }

        let result = self.inner.load().lookup(addr);
        self.cache_insert(generation, addr, result);
        result
    }

    fn cache_insert(&self, generation: u64, addr: IpAddr, result: Option<CountryCode>) {
        if let Some(ref cache) = self.cache {
            cache.insert(addr, (generation, result));
        }
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        match self.cache {
            Some(ref cache) => CacheStats {
                capacity: self.config.cache_capacity,
                len: cache.len(),
                enabled: true,
            },
            None => CacheStats {
                capacity: 0,
                len: 0,
                enabled: false,
            },
        }
    }

    /// Get the current generation (incremented on each reload).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The database currently serving lookups.
    ///
    /// The returned guard may become stale after a hot reload.
    pub fn inner(&self) -> arc_swap::Guard<Arc<CountryDb>> {
        self.inner.load()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Maximum cache capacity.
    pub capacity: usize,
    /// Current number of entries in the cache.
    pub len: usize,
    /// Whether caching is enabled.
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Record;

    fn v4_bytes(records: &[(&str, &str)]) -> Vec<u8> {
        let mut data = Vec::new();
        for (addr, country) in records {
            Record::new(addr.parse().unwrap(), CountryCode::parse(country).unwrap())
                .write_to(&mut data)
                .unwrap();
        }
        data
    }

    fn create_test_db() -> CountryDb {
        let v4 = v4_bytes(&[("1.0.0.0", "AU"), ("8.0.0.0", "US")]);
        CountryDb::from_bytes(v4, Vec::new()).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_cached_lookup() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());

        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap().as_bytes(), b"US");
        assert_eq!(db.lookup(ip("1.1.1.1")).unwrap().as_bytes(), b"AU");
        assert_eq!(db.lookup(ip("0.1.2.3")), None);
        assert_eq!(db.lookup(ip("2001:db8::1")), None);
    }

    #[test]
    fn test_cache_hit() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());

        let _ = db.lookup(ip("8.8.8.8"));
        assert_eq!(db.cache_stats().len, 1);

        let _ = db.lookup(ip("8.8.8.8"));
        assert_eq!(db.cache_stats().len, 1);

        // Unknown results are cached too
        let _ = db.lookup(ip("0.0.0.1"));
        assert_eq!(db.cache_stats().len, 2);
    }

    #[test]
    fn test_hot_reload() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());
        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap().as_bytes(), b"US");
        assert_eq!(db.generation(), 0);

        let v4 = v4_bytes(&[("1.0.0.0", "AU"), ("8.8.0.0", "CA")]);
        db.reload_from(CountryDb::from_bytes(v4, Vec::new()).unwrap());

        assert_eq!(db.generation(), 1);
        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap().as_bytes(), b"CA");
    }

    #[test]
    fn test_cache_clear_on_reload() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());
        let _ = db.lookup(ip("8.8.8.8"));
        let _ = db.lookup(ip("1.1.1.1"));
        assert_eq!(db.cache_stats().len, 2);

        db.reload_from(create_test_db());
        assert_eq!(db.cache_stats().len, 0);
    }

    #[test]
    fn test_reload_from_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("next");
        std::fs::write(
            crate::format::output_path(&prefix, crate::AddressFamily::V4),
            v4_bytes(&[("0.0.0.0", "ZZ")]),
        )
        .unwrap();

        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());
        db.reload(&prefix).unwrap();
        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap().as_bytes(), b"ZZ");

        // A failed reload keeps serving the current database
        let broken = dir.path().join("broken");
        std::fs::write(
            crate::format::output_path(&broken, crate::AddressFamily::V4),
            [0u8; 7],
        )
        .unwrap();
        assert!(db.reload(&broken).is_err());
        assert_eq!(db.generation(), 1);
        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap().as_bytes(), b"ZZ");
    }

    #[test]
    fn test_result_from_before_reload_not_served() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::default());
        let addr = ip("8.8.8.8");

        // A lookup reads the old database, then a reload lands before it
        // gets to insert its answer
        let generation = db.generation();
        let old = db.inner().lookup(addr);
        assert_eq!(old.unwrap().as_bytes(), b"US");

        let v4 = v4_bytes(&[("1.0.0.0", "AU"), ("8.8.0.0", "CA")]);
        db.reload_from(CountryDb::from_bytes(v4, Vec::new()).unwrap());
        db.cache_insert(generation, addr, old);

        assert_eq!(db.lookup(addr).unwrap().as_bytes(), b"CA");
        assert_eq!(db.lookup(addr).unwrap().as_bytes(), b"CA");
        assert_eq!(db.inner().lookup(addr).unwrap().as_bytes(), b"CA");
    }

    #[test]
    fn test_no_cache_config() {
        let db = CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::no_cache());

        let _ = db.lookup(ip("8.8.8.8"));
        let stats = db.cache_stats();
        assert!(!stats.enabled);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn test_custom_capacity() {
        let db =
            CachedCountryDb::with_config(create_test_db(), CachedReaderConfig::with_capacity(100));

        let stats = db.cache_stats();
        assert!(stats.enabled);
        assert_eq!(stats.capacity, 100);
    }
}
