//! Layered configuration, following `LibraryConfig::from_file` (`config`
//! crate over a TOML file) but trimmed of its `derive_builder` macro in
//! favor of a plain `Default` impl — the option surface here is flat
//! enough not to need a generated builder.

use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::extensions::{default_extension_config, ExtensionConfig, SupportedExtension};
use crate::rules::Action;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Track,
    Album,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmChoice {
    Exact,
    Perceptual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendChoice {
    Sqlite,
    LegacyJson,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    Record,
    Flat,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuperscooperConfig {
    pub mode: Mode,
    pub algorithm: AlgorithmChoice,
    pub similarity_threshold: f64,
    pub worker_count: Option<usize>,
    pub cache_backend: CacheBackendChoice,
    pub cache_path_override: Option<PathBuf>,
    pub extension_config: HashMap<SupportedExtension, ExtensionConfig>,
    pub partial_album_matching: bool,
    pub partial_album_min_overlap: f64,
    pub staging_root_override: Option<PathBuf>,
    pub output_shape: OutputShape,
    pub default_rule_action: Action,
    pub fingerprinter_binary: String,
    pub probe_binary: String,
}

impl Default for DuperscooperConfig {
    fn default() -> Self {
        DuperscooperConfig {
            mode: Mode::Track,
            algorithm: AlgorithmChoice::Perceptual,
            similarity_threshold: 97.0,
            worker_count: None,
            cache_backend: CacheBackendChoice::Sqlite,
            cache_path_override: None,
            extension_config: default_extension_config(),
            partial_album_matching: false,
            partial_album_min_overlap: 0.5,
            staging_root_override: None,
            output_shape: OutputShape::Record,
            default_rule_action: Action::Keep,
            fingerprinter_binary: "fpcalc".to_string(),
            probe_binary: "ffprobe".to_string(),
        }
    }
}

impl DuperscooperConfig {
    /// Layers a TOML file over the built-in defaults, then an
    /// environment-variable override layer prefixed `DUPERSCOOPER_`
    /// (e.g. `DUPERSCOOPER_SIMILARITY_THRESHOLD=95`), mirroring the
    /// teacher's `config::Config::builder()` usage.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&DuperscooperConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if path.is_file() {
                builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("DUPERSCOOPER").separator("_"));

        builder.build()?.try_deserialize()
    }

    pub fn worker_count_resolved(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = DuperscooperConfig::default();
        assert_eq!(cfg.similarity_threshold, 97.0);
        assert_eq!(cfg.mode, Mode::Track);
        assert_eq!(cfg.algorithm, AlgorithmChoice::Perceptual);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = DuperscooperConfig::load(None).unwrap();
        assert_eq!(cfg.cache_backend, CacheBackendChoice::Sqlite);
    }

    #[test]
    fn worker_count_resolves_to_at_least_one() {
        let mut cfg = DuperscooperConfig::default();
        cfg.worker_count = Some(0);
        assert_eq!(cfg.worker_count_resolved(), 0usize.max(1));
    }
}
