//! Legacy flat-file cache backend: a single JSON document held fully in
//! memory. Documented and enforced as single-writer: concurrent access
//! from more than one thread is a fatal configuration error, not
//! something this backend silently serializes — callers who need
//! concurrent fingerprint production should use the sqlite backend
//! instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, TryLockError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

use super::{BackendKind, Cache, LegacyEntry, StatsReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    fingerprint: String,
    algorithm: String,
    inserted_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    entries: HashMap<String, Entry>,
}

struct Counters {
    hits: u64,
    misses: u64,
}

pub struct LegacyJsonCache {
    path: PathBuf,
    document: Mutex<Document>,
    stats: Mutex<Counters>,
}

impl LegacyJsonCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let document = if path.is_file() {
            let raw = std::fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                Document::default()
            } else {
                serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt(e.to_string()))?
            }
        } else {
            Document::default()
        };

        Ok(LegacyJsonCache {
            path: path.to_path_buf(),
            document: Mutex::new(document),
            stats: Mutex::new(Counters { hits: 0, misses: 0 }),
        })
    }

    /// Locks the in-memory document without blocking; a contended lock
    /// means a second thread is already touching this cache, which the
    /// legacy backend does not support.
    fn lock_document(&self) -> Result<std::sync::MutexGuard<'_, Document>, CacheError> {
        match self.document.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(CacheError::ConcurrentLegacyAccess),
            Err(TryLockError::Poisoned(_)) => Err(CacheError::Corrupt(
                "legacy cache document lock poisoned by a prior panic".to_string(),
            )),
        }
    }

    fn flush(&self, document: &Document) -> Result<(), CacheError> {
        let raw = serde_json::to_string_pretty(document).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Exports every entry for import into another backend via its
    /// `migrate_legacy`. The inverse direction of `Cache::migrate_legacy`.
    pub fn export_entries(&self) -> Result<Vec<LegacyEntry>, CacheError> {
        let document = self.lock_document()?;
        Ok(document
            .entries
            .iter()
            .filter_map(|(hash, entry)| {
                Fingerprint::from_csv(&entry.fingerprint).map(|fp| LegacyEntry {
                    content_hash: hash.clone(),
                    fingerprint: fp,
                    algorithm: entry.algorithm.clone(),
                    inserted_at: Some(entry.inserted_at),
                    last_access: Some(entry.last_access),
                })
            })
            .collect())
    }
}

impl Cache for LegacyJsonCache {
    fn get(&self, content_hash: &str) -> Result<Option<Fingerprint>, CacheError> {
        let mut document = self.lock_document()?;
        let mut stats = self.stats.lock().unwrap();

        match document.entries.get_mut(content_hash) {
            Some(entry) => {
                entry.last_access = Utc::now();
                stats.hits += 1;
                Ok(Fingerprint::from_csv(&entry.fingerprint))
            }
            None => {
                stats.misses += 1;
                Ok(None)
            }
        }
    }

    fn set(&self, content_hash: &str, fingerprint: &Fingerprint, algorithm: &str) -> Result<(), CacheError> {
        let mut document = self.lock_document()?;
        let now = Utc::now();
        document
            .entries
            .entry(content_hash.to_string())
            .and_modify(|e| {
                e.fingerprint = fingerprint.to_csv();
                e.algorithm = algorithm.to_string();
                e.last_access = now;
            })
            .or_insert(Entry {
                fingerprint: fingerprint.to_csv(),
                algorithm: algorithm.to_string(),
                inserted_at: now,
                last_access: now,
            });
        self.flush(&document)
    }

    fn stats(&self) -> StatsReport {
        let document = self.document.lock().unwrap();
        let stats = self.stats.lock().unwrap();
        StatsReport {
            hits: stats.hits,
            misses: stats.misses,
            size: document.entries.len() as u64,
            backend_kind: BackendKind::LegacyJson,
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut document = self.lock_document()?;
        document.entries.clear();
        self.flush(&document)
    }

    fn cleanup_old(&self, max_age: Duration) -> Result<u64, CacheError> {
        let mut document = self.lock_document()?;
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let before = document.entries.len();
        document.entries.retain(|_, e| e.last_access >= cutoff);
        let removed = (before - document.entries.len()) as u64;
        self.flush(&document)?;
        Ok(removed)
    }

    fn migrate_legacy(&self, entries: Vec<LegacyEntry>) -> Result<u64, CacheError> {
        warn!("migrate_legacy called on the legacy backend itself; this is a no-op target");
        let mut document = self.lock_document()?;
        let now = Utc::now();
        let mut imported = 0u64;
        for entry in entries {
            document.entries.entry(entry.content_hash).or_insert_with(|| {
                imported += 1;
                Entry {
                    fingerprint: entry.fingerprint.to_csv(),
                    algorithm: entry.algorithm,
                    inserted_at: entry.inserted_at.unwrap_or(now),
                    last_access: entry.last_access.unwrap_or(now),
                }
            });
        }
        self.flush(&document)?;
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn miss_then_hit_after_set() {
        let dir = tempdir().unwrap();
        let cache = LegacyJsonCache::open(&dir.path().join("cache.json")).unwrap();
        assert!(cache.get("h").unwrap().is_none());
        let fp = Fingerprint::new(vec![1, 2, 3]);
        cache.set("h", &fp, "chromaprint").unwrap();
        assert_eq!(cache.get("h").unwrap(), Some(fp));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let cache = LegacyJsonCache::open(&path).unwrap();
            cache.set("h", &Fingerprint::new(vec![7]), "chromaprint").unwrap();
        }
        let reopened = LegacyJsonCache::open(&path).unwrap();
        assert_eq!(reopened.get("h").unwrap(), Some(Fingerprint::new(vec![7])));
    }

    #[test]
    fn concurrent_access_is_a_fatal_error_not_a_silent_block() {
        let dir = tempdir().unwrap();
        let cache = LegacyJsonCache::open(&dir.path().join("cache.json")).unwrap();
        let _guard = cache.document.lock().unwrap();
        let result = cache.set("h", &Fingerprint::new(vec![1]), "chromaprint");
        assert!(matches!(result, Err(CacheError::ConcurrentLegacyAccess)));
    }

    #[test]
    fn cleanup_old_removes_only_stale_entries() {
        let dir = tempdir().unwrap();
        let cache = LegacyJsonCache::open(&dir.path().join("cache.json")).unwrap();
        cache.set("fresh", &Fingerprint::new(vec![1]), "chromaprint").unwrap();
        {
            let mut document = cache.document.lock().unwrap();
            let entry = document.entries.get_mut("fresh").unwrap();
            entry.last_access = Utc::now() - chrono::Duration::days(30);
        }
        let removed = cache.cleanup_old(Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.stats().size, 0);
    }
}
