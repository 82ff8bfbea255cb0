//! Resolves the per-user directories duperscooper reads and writes: the
//! fingerprint cache database, the legacy flat-file cache, and the default
//! user config file. Carries no duplicate-detection logic of its own.

mod errors;
mod paths;

pub use errors::Error;
pub use paths::DuperscooperPaths;

use once_cell::sync::Lazy;

/// Global singleton, resolved once per process.
pub static PATHS: Lazy<DuperscooperPaths> =
    Lazy::new(|| DuperscooperPaths::new().expect("failed to resolve duperscooper directories"));

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn new(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            unsafe { std::env::set_var(key, value) };
            EnvVarGuard {
                key: key.to_owned(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => unsafe { std::env::set_var(&self.key, val) },
                None => unsafe { std::env::remove_var(&self.key) },
            }
        }
    }

    #[test]
    fn new_creates_structure() {
        let tmp = tempdir().unwrap();
        let _env = EnvVarGuard::new("DUPERSCOOPER_BASE_DIR", tmp.path().to_str().unwrap());

        let paths = DuperscooperPaths::new().unwrap();

        assert!(paths.config_dir.exists());
        assert!(paths.cache_dir.exists());
        assert_eq!(paths.cache_db, paths.cache_dir.join("fingerprints.db"));
        let expected_config: PathBuf = tmp.path().join("config").join("config.toml");
        assert_eq!(paths.config_file, expected_config);
    }
}
