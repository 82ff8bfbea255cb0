//! Supported audio extensions and per-extension size filtering, a direct
//! port of the enum-plus-const-table shape used elsewhere for extension
//! tables.

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-extension scan constraint. Default minimum file size is 1 MiB
/// across every extension (0 disables filtering); formats aren't
/// special-cased individually — quality varies far more by
/// bitrate/sample-rate than by container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionConfig {
    pub min_file_size: ByteSize,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        ExtensionConfig {
            min_file_size: ByteSize::mib(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SupportedExtension {
    Mp3,
    Aac,
    Mp4,
    M4a,
    Ogg,
    Opus,
    Wav,
    Flac,
    Wma,
    Alac,
    Ape,
}

impl SupportedExtension {
    pub const ALL: &'static [SupportedExtension] = &[
        SupportedExtension::Mp3,
        SupportedExtension::Aac,
        SupportedExtension::Mp4,
        SupportedExtension::M4a,
        SupportedExtension::Ogg,
        SupportedExtension::Opus,
        SupportedExtension::Wav,
        SupportedExtension::Flac,
        SupportedExtension::Wma,
        SupportedExtension::Alac,
        SupportedExtension::Ape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedExtension::Mp3 => "mp3",
            SupportedExtension::Aac => "aac",
            SupportedExtension::Mp4 => "mp4",
            SupportedExtension::M4a => "m4a",
            SupportedExtension::Ogg => "ogg",
            SupportedExtension::Opus => "opus",
            SupportedExtension::Wav => "wav",
            SupportedExtension::Flac => "flac",
            SupportedExtension::Wma => "wma",
            SupportedExtension::Alac => "alac",
            SupportedExtension::Ape => "ape",
        }
    }
}

impl std::str::FromStr for SupportedExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        SupportedExtension::ALL
            .iter()
            .find(|ext| ext.as_str() == lower)
            .copied()
            .ok_or_else(|| format!("extension not supported: {s}"))
    }
}

impl std::fmt::Display for SupportedExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn default_extension_config() -> HashMap<SupportedExtension, ExtensionConfig> {
    SupportedExtension::ALL
        .iter()
        .map(|&ext| (ext, ExtensionConfig::default()))
        .collect()
}
