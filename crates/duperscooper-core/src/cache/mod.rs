//! Persistent, thread-safe fingerprint cache. Polymorphic over two
//! backends behind a trait object: the backend is a runtime choice
//! (CLI flag / config), not a compile-time one, so this is `dyn Cache`,
//! not a generic parameter.

mod legacy;
mod sqlite;

pub use legacy::LegacyJsonCache;
pub use sqlite::SqliteCache;

use std::time::Duration;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    LegacyJson,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
}

pub struct StatsReport {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub backend_kind: BackendKind,
}

/// A single imported row, used by `migrate_legacy`.
pub struct LegacyEntry {
    pub content_hash: String,
    pub fingerprint: Fingerprint,
    pub algorithm: String,
    pub inserted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_access: Option<chrono::DateTime<chrono::Utc>>,
}

/// The capability set every cache backend exposes.
pub trait Cache: Send + Sync {
    fn get(&self, content_hash: &str) -> Result<Option<Fingerprint>, CacheError>;

    fn set(&self, content_hash: &str, fingerprint: &Fingerprint, algorithm: &str) -> Result<(), CacheError>;

    fn stats(&self) -> StatsReport;

    fn clear(&self) -> Result<(), CacheError>;

    fn cleanup_old(&self, max_age: Duration) -> Result<u64, CacheError>;

    /// One-shot import from the legacy flat-file representation. Returns
    /// the number of entries imported. Preserves timestamps where present.
    fn migrate_legacy(&self, entries: Vec<LegacyEntry>) -> Result<u64, CacheError>;
}
