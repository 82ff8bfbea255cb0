//! Staging and restoration engine.
//! Grounded on the manifest/snapshot shape of the pack's backup tooling
//! (`NovaPcSuite`'s `Manifest`/`ManifestStore`), adapted from an async
//! chunked-backup model to a synchronous move-and-restore model: a batch
//! is a UUID-named directory under `.deletedByDuperscooper/` holding moved
//! files plus a manifest, not content-addressed chunks.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StagingError;

pub const STAGING_DIR_NAME: &str = ".deletedByDuperscooper";
pub const RESTORED_DIR_NAME: &str = ".restored";
const MANIFEST_FILE_NAME: &str = "manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Track,
    Album,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestItem {
    pub original_path: PathBuf,
    pub content_hash: String,
    pub size: u64,
    pub staged_subpath: PathBuf,
    pub restored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mode: Mode,
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    pub fn all_restored(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.restored)
    }
}

pub struct StagingEngine {
    scan_root: PathBuf,
}

impl StagingEngine {
    pub fn new(scan_root: impl Into<PathBuf>) -> Self {
        StagingEngine {
            scan_root: scan_root.into(),
        }
    }

    fn staging_root(&self) -> PathBuf {
        self.scan_root.join(STAGING_DIR_NAME)
    }

    fn batch_dir(&self, batch_id: Uuid) -> PathBuf {
        self.staging_root().join(batch_id.to_string())
    }

    fn restored_dir(&self, batch_id: Uuid) -> PathBuf {
        self.staging_root().join(RESTORED_DIR_NAME).join(batch_id.to_string())
    }

    /// Moves each path (preserving its path relative to `scan_root`) into a
    /// freshly minted batch directory and writes the manifest. Pre-computed
    /// content hashes are taken from the caller (the scanner already hashed
    /// every file) rather than recomputed here.
    pub fn stage(&self, items: &[(PathBuf, String, u64)], mode: Mode) -> Result<Uuid, StagingError> {
        let batch_id = Uuid::new_v4();
        let batch_dir = self.batch_dir(batch_id);
        std::fs::create_dir_all(&batch_dir).map_err(|source| StagingError::Move {
            path: batch_dir.clone(),
            source,
        })?;

        let mut manifest_items = Vec::with_capacity(items.len());
        for (path, content_hash, size) in items {
            let relative = path.strip_prefix(&self.scan_root).unwrap_or(path);
            let staged_subpath = relative.to_path_buf();
            let target = batch_dir.join(&staged_subpath);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StagingError::Move {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            std::fs::rename(path, &target).map_err(|source| StagingError::Move {
                path: path.clone(),
                source,
            })?;

            manifest_items.push(ManifestItem {
                original_path: path.clone(),
                content_hash: content_hash.clone(),
                size: *size,
                staged_subpath,
                restored: false,
            });
        }

        let manifest = Manifest {
            batch_id,
            created_at: Utc::now(),
            mode,
            items: manifest_items,
        };
        self.write_manifest(&batch_dir, &manifest)?;

        info!(%batch_id, count = manifest.items.len(), "staged batch for deletion");
        Ok(batch_id)
    }

    fn write_manifest(&self, batch_dir: &Path, manifest: &Manifest) -> Result<(), StagingError> {
        let raw = serde_json::to_string_pretty(manifest).expect("manifest serialization cannot fail");
        std::fs::write(batch_dir.join(MANIFEST_FILE_NAME), raw).map_err(|source| StagingError::Move {
            path: batch_dir.join(MANIFEST_FILE_NAME),
            source,
        })
    }

    pub fn read_manifest(&self, batch_id: Uuid) -> Result<Manifest, StagingError> {
        let path = self.batch_dir(batch_id).join(MANIFEST_FILE_NAME);
        let raw = std::fs::read_to_string(&path).map_err(|_| StagingError::ManifestUnreadable(batch_id))?;
        serde_json::from_str(&raw).map_err(|_| StagingError::ManifestUnreadable(batch_id))
    }

    pub fn list_batches(&self) -> Vec<Uuid> {
        let root = self.staging_root();
        let mut batches = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                if entry.file_name() == RESTORED_DIR_NAME {
                    continue;
                }
                if let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) {
                    batches.push(id);
                }
            }
        }
        batches
    }

    /// Restores every item in a batch, verifying content hash before the
    /// move back — restoration fails if staged bytes disagree. Fully-
    /// restored batches are archived under `.restored/`.
    pub fn restore(&self, batch_id: Uuid) -> Result<(), StagingError> {
        let mut manifest = self.read_manifest(batch_id)?;
        let batch_dir = self.batch_dir(batch_id);

        for item in manifest.items.iter_mut() {
            if item.restored {
                continue;
            }

            let staged_path = batch_dir.join(&item.staged_subpath);
            let actual_hash = hash_file(&staged_path)?;
            if actual_hash != item.content_hash {
                return Err(StagingError::HashMismatch(staged_path));
            }

            if item.original_path.exists() {
                return Err(StagingError::TargetCollision(item.original_path.clone()));
            }

            if let Some(parent) = item.original_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StagingError::Move {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            std::fs::rename(&staged_path, &item.original_path).map_err(|source| StagingError::Move {
                path: staged_path.clone(),
                source,
            })?;
            item.restored = true;
        }

        self.write_manifest(&batch_dir, &manifest)?;

        if manifest.all_restored() {
            self.archive(batch_id)?;
        }

        Ok(())
    }

    fn archive(&self, batch_id: Uuid) -> Result<(), StagingError> {
        let from = self.batch_dir(batch_id);
        let to = self.restored_dir(batch_id);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StagingError::Move {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::rename(&from, &to).map_err(|source| StagingError::Move { path: from, source })?;
        info!(%batch_id, "batch fully restored, archived");
        Ok(())
    }

    /// Permanently deletes batches older than `max_age`, or all batches if
    /// `max_age` is `None`.
    pub fn empty(&self, max_age: Option<std::time::Duration>) -> Result<u64, StagingError> {
        let mut removed = 0u64;
        for batch_id in self.list_batches() {
            let manifest = match self.read_manifest(batch_id) {
                Ok(m) => m,
                Err(_) => continue,
            };

            let stale = match max_age {
                Some(max_age) => {
                    let age = Utc::now().signed_duration_since(manifest.created_at);
                    age.to_std().map(|a| a >= max_age).unwrap_or(true)
                }
                None => true,
            };

            if stale {
                let dir = self.batch_dir(batch_id);
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    warn!(%batch_id, error = %e, "failed to remove staging batch");
                    continue;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub(crate) fn hash_file(path: &Path) -> Result<String, StagingError> {
    let bytes = std::fs::read(path).map_err(|source| StagingError::Move {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(path: &Path, contents: &[u8]) -> (String, u64) {
        std::fs::write(path, contents).unwrap();
        (hash_file(path).unwrap(), contents.len() as u64)
    }

    #[test]
    fn stage_then_restore_round_trip() {
        let root = tempdir().unwrap();
        let file_path = root.path().join("track.flac");
        let (hash, size) = write_file(&file_path, b"audio bytes");

        let engine = StagingEngine::new(root.path());
        let batch_id = engine.stage(&[(file_path.clone(), hash, size)], Mode::Track).unwrap();

        assert!(!file_path.exists());
        engine.restore(batch_id).unwrap();
        assert!(file_path.exists());
        assert_eq!(std::fs::read(&file_path).unwrap(), b"audio bytes");
    }

    #[test]
    fn fully_restored_batch_is_archived() {
        let root = tempdir().unwrap();
        let file_path = root.path().join("track.flac");
        let (hash, size) = write_file(&file_path, b"abc");

        let engine = StagingEngine::new(root.path());
        let batch_id = engine.stage(&[(file_path, hash, size)], Mode::Track).unwrap();
        engine.restore(batch_id).unwrap();

        assert!(engine.restored_dir(batch_id).join(MANIFEST_FILE_NAME).exists());
        assert!(!engine.batch_dir(batch_id).exists());
    }

    #[test]
    fn restore_rejects_tampered_staged_bytes() {
        let root = tempdir().unwrap();
        let file_path = root.path().join("track.flac");
        let (hash, size) = write_file(&file_path, b"original");

        let engine = StagingEngine::new(root.path());
        let batch_id = engine.stage(&[(file_path, hash, size)], Mode::Track).unwrap();

        let manifest = engine.read_manifest(batch_id).unwrap();
        let staged = engine.batch_dir(batch_id).join(&manifest.items[0].staged_subpath);
        std::fs::write(&staged, b"tampered!").unwrap();

        let result = engine.restore(batch_id);
        assert!(matches!(result, Err(StagingError::HashMismatch(_))));
    }

    #[test]
    fn empty_with_no_max_age_removes_every_batch() {
        let root = tempdir().unwrap();
        let file_path = root.path().join("track.flac");
        let (hash, size) = write_file(&file_path, b"abc");

        let engine = StagingEngine::new(root.path());
        engine.stage(&[(file_path, hash, size)], Mode::Track).unwrap();
        assert_eq!(engine.list_batches().len(), 1);

        let removed = engine.empty(None).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.list_batches().is_empty());
    }
}
