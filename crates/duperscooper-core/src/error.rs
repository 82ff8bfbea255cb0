//! Subsystem error enums. Internal library errors are scoped per subsystem
//! in the style of `ConfigError`/`AnalysisError`; top-level orchestration
//! uses `anyhow`.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    #[error("unreadable file: {0}")]
    Unreadable(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("fingerprinter tool not found: {0}")]
    ToolMissing(String),

    #[error("fingerprinter tool failed: {0}")]
    ToolError(String),

    #[error("could not parse fingerprinter output: {0}")]
    ParseError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("unreadable file: {0}")]
    Unreadable(PathBuf),

    #[error("metadata probe tool not found: {0}")]
    ToolMissing(String),

    #[error("metadata probe tool failed: {0}")]
    ToolError(String),

    #[error("could not parse metadata probe output: {0}")]
    ParseError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache backend failed to open: {0}")]
    Open(String),

    #[error("cache query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("legacy flat-file cache does not support concurrent access")]
    ConcurrentLegacyAccess,

    #[error("legacy cache file is corrupt: {0}")]
    Corrupt(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StagingError {
    #[error("I/O error while staging {path}: {source}")]
    Move {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no such staging batch: {0}")]
    UnknownBatch(uuid::Uuid),

    #[error("manifest missing or unreadable for batch {0}")]
    ManifestUnreadable(uuid::Uuid),

    #[error("content hash mismatch restoring {0}: staged bytes do not match manifest")]
    HashMismatch(PathBuf),

    #[error("restore target already exists: {0}")]
    TargetCollision(PathBuf),
}

#[derive(thiserror::Error, Debug)]
pub enum RulesError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("invalid regex in rule {rule:?}: {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule config parse error: {0}")]
    ParseError(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("could not parse scan result: {0}")]
    InvalidScanResult(String),

    #[error(transparent)]
    Staging(#[from] StagingError),
}
