//! Durable stores backing the quote/chart cache

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::CacheEntry;
use crate::error::{ChartError, Result};

/// Key-value document store addressed by `"{symbol}:{interval}"` keys.
///
/// `QuoteChartCache` only restores and saves whole snapshots through
/// `load_all`/`save_all`; `get`/`put` address single documents for tools that
/// inspect or seed a store.
pub trait CacheStore: Send + Sync {
    /// Fetch one document, `NotFound` if absent
    fn get(&self, key: &str) -> Result<CacheEntry>;

    /// Write one document, overwriting any previous value
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Read every document. An uninitialized store is empty, not an error.
    fn load_all(&self) -> Result<Vec<CacheEntry>>;

    /// Replace the store contents with a full snapshot
    fn save_all(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// Single JSON file holding a document-key → entry object
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self) -> String {
        self.path.display().to_string()
    }

    fn read_documents(&self) -> Result<BTreeMap<String, CacheEntry>> {
        if !self.path.exists() {
            debug!("Cache file {} does not exist yet", self.path.display());
            return Ok(BTreeMap::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ChartError::persistence(self.key(), e))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| ChartError::persistence(self.key(), e))
    }

    fn write_documents(&self, documents: &BTreeMap<String, CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ChartError::persistence(self.key(), e))?;
            }
        }

        let content = serde_json::to_string(documents)
            .map_err(|e| ChartError::persistence(self.key(), e))?;

        // Write next to the target and rename so readers never see a partial file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| ChartError::persistence(self.key(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| ChartError::persistence(self.key(), e))?;

        debug!(
            "Saved {} cache documents to {}",
            documents.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl CacheStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<CacheEntry> {
        self.read_documents()?
            .remove(key)
            .ok_or_else(|| ChartError::NotFound(format!("cache document {}", key)))
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut documents = self.read_documents()?;
        documents.insert(key.to_string(), entry.clone());
        self.write_documents(&documents)
    }

    fn load_all(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.read_documents()?.into_values().collect())
    }

    fn save_all(&self, entries: &[CacheEntry]) -> Result<()> {
        let documents = entries
            .iter()
            .map(|entry| (entry.key.document_key(), entry.clone()))
            .collect();
        self.write_documents(&documents)
    }
}

/// In-process store, for tests and runs without a cache path
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, CacheEntry>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full snapshots written
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<CacheEntry> {
        self.documents
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| ChartError::NotFound(format!("cache document {}", key)))
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.documents.lock().insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.documents.lock().values().cloned().collect())
    }

    fn save_all(&self, entries: &[CacheEntry]) -> Result<()> {
        let mut documents = self.documents.lock();
        documents.clear();
        for entry in entries {
            documents.insert(entry.key.document_key(), entry.clone());
        }
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CachedValue};
    use crate::model::Quote;
    use chrono::Utc;
    use tempfile::TempDir;

    fn quote_entry(symbol: &str, price: f64) -> CacheEntry {
        CacheEntry {
            key: CacheKey::quote(symbol),
            value: CachedValue::Quote(Quote {
                symbol: symbol.to_string(),
                latest_price: price,
                ..Default::default()
            }),
            last_update_time: Utc::now(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache.json"));
        assert!(store.load_all().unwrap().is_empty());
        assert!(matches!(store.get("AAPL:quote"), Err(ChartError::NotFound(_))));
    }

    #[test]
    fn test_json_store_document_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("cache.json"));
        let entry = quote_entry("AAPL", 218.5);

        store.put("AAPL:quote", &entry).unwrap();

        assert_eq!(store.get("AAPL:quote").unwrap(), entry);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_save_all_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache.json"));
        store.put("OLD:quote", &quote_entry("OLD", 1.0)).unwrap();

        store
            .save_all(&[quote_entry("AAPL", 1.0), quote_entry("MSFT", 2.0)])
            .unwrap();

        let keys: Vec<String> = store
            .load_all()
            .unwrap()
            .iter()
            .map(|e| e.key.document_key())
            .collect();
        assert_eq!(keys, vec!["AAPL:quote", "MSFT:quote"]);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();

        let result = JsonFileStore::new(&path).load_all();
        assert!(matches!(result, Err(ChartError::Persistence { .. })));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.put("SPY:quote", &quote_entry("SPY", 500.0)).unwrap();
        assert!(store.get("SPY:quote").is_ok());
        assert!(store.get("SPY:2y").is_err());

        store.save_all(&[]).unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.load_all().unwrap().is_empty());
    }
}
