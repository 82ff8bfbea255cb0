use std::{env, fs, path::PathBuf};

use directories::ProjectDirs;
use tracing::{info, instrument};

use crate::errors::Error;

/// Name of the env var for a portable base-dir override, used by the test
/// suite and by users who want duperscooper's state kept alongside the
/// binary instead of in the OS-standard locations.
const ENV_BASE_DIR: &str = "DUPERSCOOPER_BASE_DIR";

/// Container of every path duperscooper needs outside the scanned library
/// itself.
#[derive(Debug, Clone)]
pub struct DuperscooperPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,

    /// Default user config file (TOML).
    pub config_file: PathBuf,
    /// Default durable (SQLite/WAL) fingerprint cache.
    pub cache_db: PathBuf,
    /// Default legacy flat-file fingerprint cache.
    pub legacy_cache_file: PathBuf,
}

impl DuperscooperPaths {
    #[instrument(name = "DuperscooperPaths::new", err, skip_all)]
    pub fn new() -> Result<Self, Error> {
        let (config_dir, cache_dir) = if let Ok(base) = env::var(ENV_BASE_DIR) {
            info!("using portable base dir");
            let base = PathBuf::from(base);
            (base.join("config"), base.join("cache"))
        } else {
            let proj = ProjectDirs::from("org", "duperscooper", "duperscooper").ok_or(Error::NoHome)?;
            (proj.config_dir().to_path_buf(), proj.cache_dir().to_path_buf())
        };

        let paths = DuperscooperPaths {
            config_file: config_dir.join("config.toml"),
            cache_db: cache_dir.join("fingerprints.db"),
            legacy_cache_file: cache_dir.join("fingerprints.json"),
            config_dir,
            cache_dir,
        };

        paths.ensure_structure()?;
        Ok(paths)
    }

    fn ensure_structure(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.config_dir)?;
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}
