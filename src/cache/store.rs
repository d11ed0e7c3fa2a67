//! Keyed storage for cache entries
//!
//! Provides a disk-backed `FileCacheStore` that writes one JSON file per key and
//! an in-memory `MemoryCacheStore`. Both sit behind the `CacheStore` trait so the
//! result cache never cares where entries live.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored payload and when it was stored
///
/// Serialized as `{ "data": ..., "timestamp": <epoch millis> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached payload
    pub data: Value,
    /// When the payload was stored
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Value, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }

    /// Time elapsed since the entry was stored
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether the entry is younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Keyed storage for [`CacheEntry`] values
///
/// Errors are reported but callers are expected to treat them as misses.
pub trait CacheStore: Send + Sync {
    /// Reads the entry stored under `key`
    ///
    /// # Returns
    /// * `Ok(None)` if nothing is stored under `key`
    /// * `Err` if the entry exists but cannot be read or parsed
    fn get(&self, key: &str) -> io::Result<Option<CacheEntry>>;

    /// Stores `entry` under `key`, replacing any previous entry
    ///
    /// # Arguments
    /// * `key` - Cache key (e.g., "lending_insights")
    /// * `entry` - The payload together with its storage time
    fn set(&self, key: &str, entry: &CacheEntry) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// Stores cache entries as JSON files in a directory
///
/// Uses `~/.cache/ledgerline/` on Linux by default.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl FileCacheStore {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "ledgerline")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> io::Result<Option<CacheEntry>> {
        let content = match fs::read_to_string(self.cache_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::write(self.cache_path(key), json)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.cache_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Keeps cache entries in process memory
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> io::Result<Option<CacheEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
