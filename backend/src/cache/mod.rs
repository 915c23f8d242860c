//! Response caches - Store API responses by request signature
//!
//! The API client only ever does `get`/`set` by exact key; eviction and
//! persistence belong to the cache implementation chosen by the host.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::logs::log_warning;

/// Default cache file (relative to current dir)
pub const DEFAULT_CACHE_FILE: &str = ".skybid/cache.json";

/// Key/value store for parsed API responses.
///
/// Implementations synchronize internally so one cache can be shared by
/// every row of a run.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
}

/// In-memory cache living for one run
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }
}

/// Cache persisted as a single JSON object on disk
///
/// The file is loaded once at construction and rewritten on every `set`.
/// A missing or unreadable file starts an empty cache.
pub struct DiskCache {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl DiskCache {
    /// Open the cache at the default location
    pub fn new() -> Self {
        Self::with_path(DEFAULT_CACHE_FILE)
    }

    /// Open the cache stored at `path`
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        let path = PathBuf::from(path.as_ref());
        let entries = Self::load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> Map<String, Value> {
        let Ok(content) = fs::read_to_string(path) else {
            return Map::new();
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            _ => {
                log_warning(format!("Ignoring unreadable cache file {}", path.display()));
                Map::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and rewrite the file
    pub fn clear(&self) -> Result<(), std::io::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("cache lock poisoned"))?;
        entries.clear();
        self.persist(&entries)
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)
    }
}

impl Default for DiskCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache for DiskCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(key.to_string(), value);
        // A failed write only loses persistence, the run keeps the entry.
        if let Err(e) = self.persist(&entries) {
            log_warning(format!("Failed to write cache {}: {}", self.path.display(), e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_memory_cache_get_set() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").is_none());

        cache.set("k", json!({"test": "OK"}));
        assert_eq!(cache.get("k"), Some(json!({"test": "OK"})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disk_cache_persists_between_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = DiskCache::with_path(&path);
        cache.set("https://x.test|\"{}\"", json!({"temp": 21}));
        drop(cache);

        let reopened = DiskCache::with_path(&path);
        assert_eq!(reopened.get("https://x.test|\"{}\""), Some(json!({"temp": 21})));
    }

    #[test]
    fn test_disk_cache_ignores_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();

        let cache = DiskCache::with_path(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disk_cache_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = DiskCache::with_path(&path);
        cache.set("a", json!(1));
        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert!(DiskCache::with_path(&path).is_empty());
    }
}
