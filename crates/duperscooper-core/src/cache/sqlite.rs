//! Durable relational cache backend. Pragma set matches
//! `LocalStorage::initialize_connection`; schema is a single hand-written
//! `execute_batch` rather than a migration runner (see DESIGN.md for why).

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, trace, warn};

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

use super::{BackendKind, Cache, LegacyEntry, StatsReport};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    content_hash TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    inserted_at TEXT NOT NULL,
    last_access TEXT NOT NULL
);
";

thread_local! {
    // Keyed by database path so a single worker thread can hold
    // connections to more than one `SqliteCache` (e.g. across tests)
    // without handing a connection opened for one database to another.
    static THREAD_CONN: RefCell<Option<(PathBuf, Connection)>> = const { RefCell::new(None) };
}

/// Durable cache backend: one `rusqlite::Connection` per worker thread
/// (thread-local, lazily opened on first use), so concurrent `rayon`
/// workers never contend on a single connection/mutex — WAL mode lets
/// readers proceed while a writer commits. Hit/miss counters are the one
/// piece of state genuinely shared across threads, so those stay behind
/// a `Mutex`.
pub struct SqliteCache {
    path: PathBuf,
    stats: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        info!(path = %path.display(), "opening sqlite fingerprint cache");
        // Opened once up front so a bad path/permission error surfaces
        // immediately rather than on the first query from some worker
        // thread; each thread still opens (and initializes) its own
        // connection lazily via `with_connection`.
        let mut conn = Connection::open(path).map_err(|e| CacheError::Open(e.to_string()))?;
        Self::initialize_connection(&mut conn)?;
        Ok(SqliteCache {
            path: path.to_path_buf(),
            stats: Mutex::new(Counters::default()),
        })
    }

    fn initialize_connection(conn: &mut Connection) -> Result<(), CacheError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        conn.execute_batch(SCHEMA)?;
        trace!("sqlite cache schema ensured");
        Ok(())
    }

    /// Runs `f` against this thread's connection to `self.path`, opening
    /// and initializing one first if this thread hasn't touched this
    /// database yet.
    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T, CacheError>) -> Result<T, CacheError> {
        THREAD_CONN.with(|cell| {
            let mut slot = cell.borrow_mut();
            let needs_open = !matches!(&*slot, Some((p, _)) if p == &self.path);
            if needs_open {
                let mut conn = Connection::open(&self.path).map_err(|e| CacheError::Open(e.to_string()))?;
                Self::initialize_connection(&mut conn)?;
                *slot = Some((self.path.clone(), conn));
            }
            f(&slot.as_ref().unwrap().1)
        })
    }

    /// Like `with_connection`, but for operations (e.g. transactions)
    /// that need `&mut Connection`.
    fn with_connection_mut<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, CacheError>) -> Result<T, CacheError> {
        THREAD_CONN.with(|cell| {
            let mut slot = cell.borrow_mut();
            let needs_open = !matches!(&*slot, Some((p, _)) if p == &self.path);
            if needs_open {
                let mut conn = Connection::open(&self.path).map_err(|e| CacheError::Open(e.to_string()))?;
                Self::initialize_connection(&mut conn)?;
                *slot = Some((self.path.clone(), conn));
            }
            f(&mut slot.as_mut().unwrap().1)
        })
    }

    fn size(conn: &Connection) -> u64 {
        conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0)
            .max(0) as u64
    }
}

impl Cache for SqliteCache {
    fn get(&self, content_hash: &str) -> Result<Option<Fingerprint>, CacheError> {
        let row = self.with_connection(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT fingerprint, algorithm FROM cache_entries WHERE content_hash = ?1",
                    params![content_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if row.is_some() {
                conn.execute(
                    "UPDATE cache_entries SET last_access = datetime('now') WHERE content_hash = ?1",
                    params![content_hash],
                )?;
            }
            Ok(row)
        })?;

        let mut stats = self.stats.lock().unwrap();
        match row {
            Some((csv, _algorithm)) => {
                stats.hits += 1;
                Ok(Fingerprint::from_csv(&csv))
            }
            None => {
                stats.misses += 1;
                Ok(None)
            }
        }
    }

    fn set(&self, content_hash: &str, fingerprint: &Fingerprint, algorithm: &str) -> Result<(), CacheError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (content_hash, fingerprint, algorithm, inserted_at, last_access)
                 VALUES (?1, ?2, ?3, datetime('now'), datetime('now'))
                 ON CONFLICT(content_hash) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    algorithm = excluded.algorithm,
                    last_access = datetime('now')",
                params![content_hash, fingerprint.to_csv(), algorithm],
            )?;
            Ok(())
        })
    }

    fn stats(&self) -> StatsReport {
        let size = self.with_connection(|conn| Ok(Self::size(conn))).unwrap_or(0);
        let stats = self.stats.lock().unwrap();
        StatsReport {
            hits: stats.hits,
            misses: stats.misses,
            size,
            backend_kind: BackendKind::Sqlite,
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
    }

    fn cleanup_old(&self, max_age: Duration) -> Result<u64, CacheError> {
        self.with_connection(|conn| {
            let max_age_secs = max_age.as_secs() as i64;
            let removed = conn.execute(
                "DELETE FROM cache_entries
                 WHERE strftime('%s', 'now') - strftime('%s', last_access) > ?1",
                params![max_age_secs],
            )?;
            Ok(removed as u64)
        })
    }

    fn migrate_legacy(&self, entries: Vec<LegacyEntry>) -> Result<u64, CacheError> {
        self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let mut imported = 0u64;
            for entry in entries {
                let inserted_at = entry
                    .inserted_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "now".to_string());
                let last_access = entry
                    .last_access
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "now".to_string());

                let inserted_expr = if inserted_at == "now" {
                    "datetime('now')".to_string()
                } else {
                    format!("'{inserted_at}'")
                };
                let last_access_expr = if last_access == "now" {
                    "datetime('now')".to_string()
                } else {
                    format!("'{last_access}'")
                };

                tx.execute(
                    &format!(
                        "INSERT INTO cache_entries (content_hash, fingerprint, algorithm, inserted_at, last_access)
                         VALUES (?1, ?2, ?3, {inserted_expr}, {last_access_expr})
                         ON CONFLICT(content_hash) DO NOTHING"
                    ),
                    params![entry.content_hash, entry.fingerprint.to_csv(), entry.algorithm],
                )?;
                imported += 1;
            }
            tx.commit()?;
            if imported > 0 {
                info!(imported, "migrated legacy cache entries into sqlite backend");
            } else {
                warn!("legacy cache migration found no entries to import");
            }
            Ok(imported)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (SqliteCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let cache = SqliteCache::open(&dir.path().join("cache.sqlite")).unwrap();
        (cache, dir)
    }

    #[test]
    fn miss_then_hit_after_set() {
        let (cache, _dir) = open_temp();
        assert!(cache.get("abc").unwrap().is_none());

        let fp = Fingerprint::new(vec![1, 2, 3]);
        cache.set("abc", &fp, "chromaprint").unwrap();
        assert_eq!(cache.get("abc").unwrap(), Some(fp));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn set_is_an_upsert() {
        let (cache, _dir) = open_temp();
        let fp1 = Fingerprint::new(vec![1]);
        let fp2 = Fingerprint::new(vec![2]);
        cache.set("h", &fp1, "chromaprint").unwrap();
        cache.set("h", &fp2, "chromaprint").unwrap();
        assert_eq!(cache.get("h").unwrap(), Some(fp2));
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn clear_removes_all_entries() {
        let (cache, _dir) = open_temp();
        cache.set("a", &Fingerprint::new(vec![1]), "chromaprint").unwrap();
        cache.set("b", &Fingerprint::new(vec![2]), "chromaprint").unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn migrate_legacy_imports_entries_without_duplicating() {
        let (cache, _dir) = open_temp();
        let entries = vec![LegacyEntry {
            content_hash: "x".to_string(),
            fingerprint: Fingerprint::new(vec![9, 9]),
            algorithm: "chromaprint".to_string(),
            inserted_at: None,
            last_access: None,
        }];
        let imported = cache.migrate_legacy(entries).unwrap();
        assert_eq!(imported, 1);
        assert_eq!(cache.get("x").unwrap(), Some(Fingerprint::new(vec![9, 9])));
    }
}
