//! Quote and chart cache
//!
//! A two-tier memoization layer: an in-memory map guarded by its own lock,
//! backed by a durable [`CacheStore`]. Values cross the cache boundary only
//! as clones, so callers can never mutate a stored entry. There is no
//! expiration; entries live until overwritten.

pub mod client;
pub mod store;

pub use client::CachingClient;
pub use store::{CacheStore, JsonFileStore, MemoryStore};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ChartError, Result};
use crate::iex::{ProviderRange, Stock};
use crate::metrics::{CacheStats, CacheStatsSnapshot};
use crate::model::{Quote, validate_symbol};

/// What is cached for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
    Quote,
    Chart(ProviderRange),
}

impl CacheKind {
    pub fn interval(&self) -> &'static str {
        match self {
            CacheKind::Quote => "quote",
            CacheKind::Chart(range) => range.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub kind: CacheKind,
}

impl CacheKey {
    pub fn quote(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: CacheKind::Quote,
        }
    }

    pub fn chart(symbol: &str, range: ProviderRange) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: CacheKind::Chart(range),
        }
    }

    /// Stable key used by the durable store
    pub fn document_key(&self) -> String {
        format!("{}:{}", self.symbol, self.kind.interval())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.document_key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Quote(Quote),
    Chart(Stock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: CachedValue,
    pub last_update_time: DateTime<Utc>,
}

/// In-memory cache with a durable backing store
pub struct QuoteChartCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    store: Arc<dyn CacheStore>,
    /// Serializes full-map saves; the last writer wins
    persist_lock: Mutex<()>,
    stats: CacheStats,
}

impl QuoteChartCache {
    /// Empty cache; nothing is read from the store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
            persist_lock: Mutex::new(()),
            stats: CacheStats::new(),
        }
    }

    /// Restore the cache from the store. A failed load degrades to an empty
    /// cache rather than failing startup.
    pub fn load(store: Arc<dyn CacheStore>) -> Self {
        let cache = Self::new(store);

        match cache.store.load_all() {
            Ok(loaded) => {
                let mut entries = cache.entries.lock();
                for entry in loaded {
                    entries.insert(entry.key.clone(), entry);
                }
                info!("Loaded {} cache entries", entries.len());
            }
            Err(e) => warn!("Failed to load cache, starting empty: {}", e),
        }

        cache
    }

    /// Copy of the cached value, `NotFound` on a miss
    pub fn get(&self, key: &CacheKey) -> Result<CachedValue> {
        let value = self.entries.lock().get(key).map(|e| e.value.clone());

        match value {
            Some(value) => {
                self.stats.record_hit();
                debug!("Cache hit: {}", key);
                Ok(value)
            }
            None => {
                self.stats.record_miss();
                debug!("Cache miss: {}", key);
                Err(ChartError::NotFound(format!("cache miss: {}", key)))
            }
        }
    }

    pub fn get_quote(&self, symbol: &str) -> Option<Quote> {
        match self.get(&CacheKey::quote(symbol)) {
            Ok(CachedValue::Quote(quote)) => Some(quote),
            _ => None,
        }
    }

    pub fn get_stock(&self, symbol: &str, range: ProviderRange) -> Option<Stock> {
        match self.get(&CacheKey::chart(symbol, range)) {
            Ok(CachedValue::Chart(stock)) => Some(stock),
            _ => None,
        }
    }

    /// Store a copy of `value`, stamped with the current time
    pub fn put(&self, key: CacheKey, value: &CachedValue) -> Result<()> {
        validate_symbol(&key.symbol)?;

        let entry = CacheEntry {
            key: key.clone(),
            value: value.clone(),
            last_update_time: Utc::now(),
        };
        self.entries.lock().insert(key, entry);
        self.stats.record_put();
        Ok(())
    }

    /// Write the full map to the durable store
    pub fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let start = Instant::now();

        let snapshot: Vec<CacheEntry> = self.entries.lock().values().cloned().collect();
        self.store.save_all(&snapshot)?;

        ::metrics::histogram!(
            "chartfeed_cache_persist_ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        debug!("Persisted {} cache entries", snapshot.len());
        Ok(())
    }

    /// Time the entry was last written
    pub fn last_update_time(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        self.entries.lock().get(key).map(|e| e.last_update_time)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iex::ChartPoint;
    use tempfile::TempDir;

    fn memory_cache() -> QuoteChartCache {
        QuoteChartCache::new(Arc::new(MemoryStore::new()))
    }

    fn sample_stock() -> Stock {
        Stock {
            symbol: "AAPL".to_string(),
            quote: Some(Quote {
                symbol: "AAPL".to_string(),
                latest_price: 218.5,
                ..Default::default()
            }),
            chart: vec![ChartPoint {
                date: DateTime::from_timestamp(1_537_300_800, 0).unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10,
                change: 0.0,
                change_percent: 0.0,
            }],
        }
    }

    #[test]
    fn test_document_keys() {
        assert_eq!(CacheKey::quote("AAPL").document_key(), "AAPL:quote");
        assert_eq!(
            CacheKey::chart("AAPL", ProviderRange::TwoYears).to_string(),
            "AAPL:2y"
        );
    }

    #[test]
    fn test_get_returns_isolated_copy() {
        let cache = memory_cache();
        let key = CacheKey::chart("AAPL", ProviderRange::TwoYears);
        cache.put(key.clone(), &CachedValue::Chart(sample_stock())).unwrap();

        let mut got = cache.get(&key).unwrap();
        if let CachedValue::Chart(stock) = &mut got {
            stock.chart[0].close = -1.0;
            stock.chart.clear();
            stock.quote = None;
        }

        assert_eq!(cache.get(&key).unwrap(), CachedValue::Chart(sample_stock()));
    }

    #[test]
    fn test_put_stores_copy_of_caller_value() {
        let cache = memory_cache();
        let mut value = CachedValue::Chart(sample_stock());
        cache
            .put(CacheKey::chart("AAPL", ProviderRange::OneDay), &value)
            .unwrap();

        if let CachedValue::Chart(stock) = &mut value {
            stock.symbol = "MUTATED".to_string();
        }

        let stored = cache.get_stock("AAPL", ProviderRange::OneDay).unwrap();
        assert_eq!(stored.symbol, "AAPL");
    }

    #[test]
    fn test_round_trip_and_miss() {
        let cache = memory_cache();
        let quote = Quote {
            symbol: "MSFT".to_string(),
            company_name: "Microsoft".to_string(),
            latest_price: 410.0,
            ..Default::default()
        };
        cache
            .put(CacheKey::quote("MSFT"), &CachedValue::Quote(quote.clone()))
            .unwrap();

        assert_eq!(cache.get_quote("MSFT"), Some(quote));
        assert!(matches!(
            cache.get(&CacheKey::quote("GOOG")),
            Err(ChartError::NotFound(_))
        ));
        assert!(cache.last_update_time(&CacheKey::quote("MSFT")).is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.puts), (1, 1, 1));
    }

    #[test]
    fn test_put_rejects_invalid_symbol() {
        let cache = memory_cache();
        let result = cache.put(
            CacheKey::quote("not a symbol"),
            &CachedValue::Quote(Quote::default()),
        );
        assert!(matches!(result, Err(ChartError::Validation(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = memory_cache();
        let key = CacheKey::quote("SPY");
        for price in [1.0, 2.0] {
            let quote = Quote {
                latest_price: price,
                ..Default::default()
            };
            cache.put(key.clone(), &CachedValue::Quote(quote)).unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_quote("SPY").unwrap().latest_price, 2.0);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = QuoteChartCache::load(Arc::new(JsonFileStore::new(&path)));
        assert!(cache.is_empty());
        cache
            .put(
                CacheKey::chart("AAPL", ProviderRange::TwoYears),
                &CachedValue::Chart(sample_stock()),
            )
            .unwrap();
        cache.persist().unwrap();

        let reloaded = QuoteChartCache::load(Arc::new(JsonFileStore::new(&path)));
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get_stock("AAPL", ProviderRange::TwoYears),
            Some(sample_stock())
        );
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "garbage").unwrap();

        let cache = QuoteChartCache::load(Arc::new(JsonFileStore::new(&path)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_seeded_document_is_loaded_and_persisted_per_key() {
        let store = Arc::new(MemoryStore::new());
        let key = CacheKey::chart("AAPL", ProviderRange::TwoYears);
        let seeded = CacheEntry {
            key: key.clone(),
            value: CachedValue::Chart(sample_stock()),
            last_update_time: DateTime::from_timestamp(1_537_300_800, 0).unwrap(),
        };
        store.put(&key.document_key(), &seeded).unwrap();

        let cache = QuoteChartCache::load(store.clone());
        assert_eq!(cache.get(&key).unwrap(), seeded.value);

        cache
            .put(CacheKey::quote("MSFT"), &CachedValue::Quote(Quote::default()))
            .unwrap();
        cache.persist().unwrap();

        assert_eq!(store.get("AAPL:2y").unwrap(), seeded);
        assert!(store.get("MSFT:quote").is_ok());
        assert!(matches!(store.get("MSFT:2y"), Err(ChartError::NotFound(_))));
    }
}
