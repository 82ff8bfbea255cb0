//! Core duplicate-detection engine: fingerprint caching, external tool
//! adapters, quality scoring, scanning, grouping, album matching, staging/
//! restoration, and the rules/apply pipeline. The CLI crate is a thin
//! wrapper around this library; no duplicate-detection logic lives there.

pub mod album;
pub mod apply;
pub mod cache;
pub mod config;
pub mod error;
pub mod external;
pub mod extensions;
pub mod fingerprint;
pub mod grouping;
pub mod quality;
pub mod rules;
pub mod scanner;
pub mod serialize;
pub mod staging;
pub mod union_find;

pub use cache::{Cache, LegacyJsonCache, SqliteCache};
pub use config::DuperscooperConfig;
pub use fingerprint::Fingerprint;
pub use scanner::{Scanner, ScannerConfig, TrackRecord};
