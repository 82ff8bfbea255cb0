//! Recursive audio-file discovery and parallel fingerprint production.
//! Pool-building style matches `LocalScanner::scan`, swapping `jwalk`'s
//! concurrent walker for `walkdir` sorted into a deterministic
//! lexicographic order up front — reproducible output order is required,
//! and a parallel directory walk cannot guarantee that on its own.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::Cache;
use crate::error::{FingerprintError, ProbeError};
use crate::external::{Fingerprinter, MetadataProbe};
use crate::extensions::{ExtensionConfig, SupportedExtension};
use crate::fingerprint::Fingerprint;
use crate::quality::{quality_score, quality_string};

/// Immutable per-file record produced by a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub size: u64,
    pub content_hash: String,
    pub fingerprint: Option<Fingerprint>,
    pub codec: String,
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u32>,
    pub bitrate_bps: Option<u64>,
    pub channels: Option<u32>,
    pub lossless: bool,
    pub quality_score: f64,
    pub quality_string: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Exact,
    Perceptual,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub extensions: std::collections::HashMap<SupportedExtension, ExtensionConfig>,
    pub threads: usize,
    pub algorithm: Algorithm,
    pub update_cache: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            extensions: crate::extensions::default_extension_config(),
            threads: num_cpus::get(),
            algorithm: Algorithm::Perceptual,
            update_cache: false,
        }
    }
}

pub struct ScanProgress {
    processed: AtomicUsize,
    total: usize,
    started_at: Instant,
}

impl ScanProgress {
    fn new(total: usize) -> Self {
        ScanProgress {
            processed: AtomicUsize::new(0),
            total,
            started_at: Instant::now(),
        }
    }

    /// Running-mean based estimate of remaining time.
    pub fn eta(&self) -> Option<std::time::Duration> {
        let processed = self.processed.load(Ordering::Relaxed);
        if processed == 0 {
            return None;
        }
        let elapsed = self.started_at.elapsed();
        let mean_per_item = elapsed.as_secs_f64() / processed as f64;
        let remaining = self.total.saturating_sub(processed);
        Some(std::time::Duration::from_secs_f64(mean_per_item * remaining as f64))
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

pub struct ScanOutcome {
    pub tracks: Vec<TrackRecord>,
    pub errors: usize,
}

pub struct Scanner<'a> {
    config: ScannerConfig,
    cache: &'a dyn Cache,
    fingerprinter: Fingerprinter,
    probe: MetadataProbe,
}

impl<'a> Scanner<'a> {
    pub fn new(config: ScannerConfig, cache: &'a dyn Cache) -> Self {
        Scanner {
            config,
            cache,
            fingerprinter: Fingerprinter::new(),
            probe: MetadataProbe::new(),
        }
    }

    /// Yields files in deterministic lexicographic order, filtered by
    /// supported extension and per-extension minimum size.
    fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| self.accept(e.path()).then(|| e.path().to_path_buf()))
            .collect();
        found.sort();
        found
    }

    fn accept(&self, path: &Path) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e,
            None => return false,
        };
        let variant = match SupportedExtension::from_str(ext) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let cfg = self.config.extensions.get(&variant).copied().unwrap_or_default();
        let min_size = cfg.min_file_size.as_u64();
        if min_size == 0 {
            return true;
        }
        std::fs::metadata(path).map(|m| m.len() >= min_size).unwrap_or(false)
    }

    pub fn scan(&self, roots: &[PathBuf]) -> ScanOutcome {
        let mut discovered = Vec::new();
        for root in roots {
            discovered.extend(self.discover(root));
        }
        info!(count = discovered.len(), "discovery complete");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .build()
            .expect("failed to build fingerprint thread pool");

        let progress = Arc::new(ScanProgress::new(discovered.len()));
        let errors = AtomicUsize::new(0);
        let error_lock = Mutex::new(());
        let _ = error_lock;

        // Indexed so results can be re-sorted to discovery order afterward,
        // preserving reproducibility regardless of worker completion order.
        let mut indexed: Vec<(usize, Option<TrackRecord>)> = pool.install(|| {
            discovered
                .par_iter()
                .enumerate()
                .map(|(i, path)| {
                    let result = self.process_one(path);
                    progress.processed.fetch_add(1, Ordering::Relaxed);
                    match result {
                        Ok(record) => (i, Some(record)),
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            warn!(path = %path.display(), error = %e, "failed to process track");
                            (i, None)
                        }
                    }
                })
                .collect()
        });

        indexed.sort_by_key(|(i, _)| *i);
        let tracks: Vec<TrackRecord> = indexed.into_iter().filter_map(|(_, r)| r).collect();

        ScanOutcome {
            tracks,
            errors: errors.load(Ordering::Relaxed),
        }
    }

    fn process_one(&self, path: &Path) -> anyhow::Result<TrackRecord> {
        let content_hash = hash_file(path)?;

        let fingerprint = if self.config.algorithm == Algorithm::Perceptual {
            Some(self.resolve_fingerprint(path, &content_hash)?)
        } else {
            None
        };

        let meta = self.probe.probe(path)?;
        let size = std::fs::metadata(path)?.len();
        let score = quality_score(&meta);
        let formatted = quality_string(&meta);

        debug!(path = %path.display(), hash = %content_hash, "processed track");

        Ok(TrackRecord {
            path: path.to_path_buf(),
            size,
            content_hash,
            fingerprint,
            codec: meta.codec,
            sample_rate_hz: meta.sample_rate_hz,
            bit_depth: meta.bit_depth,
            bitrate_bps: meta.bitrate_bps,
            channels: meta.channels,
            lossless: meta.lossless,
            quality_score: score,
            quality_string: formatted,
            album: meta.album,
            artist: meta.artist,
            album_identifier: meta.album_identifier,
        })
    }

    /// Cache policy: hit reuse, update-cache bypass, write-back on
    /// compute, non-fatal degrade-to-recompute on cache failure.
    fn resolve_fingerprint(&self, path: &Path, content_hash: &str) -> Result<Fingerprint, FingerprintError> {
        if !self.config.update_cache {
            match self.cache.get(content_hash) {
                Ok(Some(fp)) => return Ok(fp),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "cache read failed, recomputing without cache"),
            }
        }

        let fp = self.fingerprinter.fingerprint(path)?;
        if let Err(e) = self.cache.set(content_hash, &fp, "chromaprint") {
            warn!(error = %e, "cache write failed, fingerprint computed but not persisted");
        }
        Ok(fp)
    }
}

pub fn hash_file(path: &Path) -> Result<String, ProbeError> {
    let bytes = std::fs::read(path).map_err(ProbeError::Io)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn hash_file_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.flac");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        let h1 = hash_file(&path).unwrap();
        let h2 = hash_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn eta_is_none_before_any_progress() {
        let progress = ScanProgress::new(10);
        assert!(progress.eta().is_none());
    }

    #[test]
    fn discover_filters_unsupported_extensions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("track.flac"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        struct NoCache;
        impl Cache for NoCache {
            fn get(&self, _: &str) -> Result<Option<Fingerprint>, crate::error::CacheError> {
                Ok(None)
            }
            fn set(&self, _: &str, _: &Fingerprint, _: &str) -> Result<(), crate::error::CacheError> {
                Ok(())
            }
            fn stats(&self) -> crate::cache::StatsReport {
                crate::cache::StatsReport {
                    hits: 0,
                    misses: 0,
                    size: 0,
                    backend_kind: crate::cache::BackendKind::Sqlite,
                }
            }
            fn clear(&self) -> Result<(), crate::error::CacheError> {
                Ok(())
            }
            fn cleanup_old(&self, _: std::time::Duration) -> Result<u64, crate::error::CacheError> {
                Ok(0)
            }
            fn migrate_legacy(&self, _: Vec<crate::cache::LegacyEntry>) -> Result<u64, crate::error::CacheError> {
                Ok(0)
            }
        }

        let cache = NoCache;
        let mut cfg = ScannerConfig::default();
        cfg.extensions.get_mut(&SupportedExtension::Flac).unwrap().min_file_size = bytesize::ByteSize::b(0);
        let scanner = Scanner::new(cfg, &cache);
        let found = scanner.discover(dir.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("track.flac"));
    }
}
