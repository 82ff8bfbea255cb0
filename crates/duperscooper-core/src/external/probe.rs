use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::ProbeError;

/// Tag keys accepted as the album identifier, matched case-insensitively.
/// `MUSICBRAINZ_ALBUMID` is the canonical one; the others are synonyms
/// seen in the wild from different taggers.
const ALBUM_IDENTIFIER_SYNONYMS: &[&str] =
    &["musicbrainz_albumid", "musicbrainz album id", "album_id", "albumid"];

/// Metadata the core needs about a track, with every field explicitly
/// optional — absence must never be conflated with zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedMetadata {
    pub codec: String,
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u32>,
    pub bitrate_bps: Option<u64>,
    pub channels: Option<u32>,
    pub lossless: bool,
    pub album_identifier: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataProbe {
    binary: String,
}

impl MetadataProbe {
    pub fn new() -> Self {
        MetadataProbe {
            binary: "ffprobe".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        MetadataProbe { binary: binary.into() }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn probe(&self, path: &Path) -> Result<ProbedMetadata, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::Unreadable(path.to_path_buf()));
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ProbeError::ToolMissing(self.binary.clone()),
                _ => ProbeError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ProbeError::ToolError(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_json(&stdout)
    }
}

impl Default for MetadataProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeDoc {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    bits_per_raw_sample: Option<String>,
    #[serde(default)]
    bits_per_sample: Option<u32>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

const LOSSLESS_CODECS: &[&str] = &["flac", "alac", "wavpack", "ape", "pcm_s16le", "pcm_s24le", "pcm_s32le"];

fn parse_probe_json(stdout: &str) -> Result<ProbedMetadata, ProbeError> {
    let doc: FfprobeDoc = serde_json::from_str(stdout).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let audio_stream = doc
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| ProbeError::ParseError("no audio stream in probe output".to_string()))?;

    let codec = audio_stream.codec_name.clone();
    let lossless = LOSSLESS_CODECS.contains(&codec.as_str());

    let sample_rate_hz = audio_stream.sample_rate.as_deref().and_then(|s| s.parse().ok());
    let bit_depth = audio_stream
        .bits_per_sample
        .filter(|&b| b > 0)
        .or_else(|| audio_stream.bits_per_raw_sample.as_deref().and_then(|s| s.parse().ok()));
    let bitrate_bps = audio_stream
        .bit_rate
        .as_deref()
        .or(doc.format.bit_rate.as_deref())
        .and_then(|s| s.parse().ok());
    let channels = audio_stream.channels;

    // Tags can live on either the stream or the container; format-level
    // tags win ties since most taggers write album/artist at that level.
    let mut tags: HashMap<String, String> = HashMap::new();
    for (k, v) in audio_stream.tags.iter() {
        tags.insert(k.to_ascii_lowercase(), v.clone());
    }
    for (k, v) in doc.format.tags.iter() {
        tags.insert(k.to_ascii_lowercase(), v.clone());
    }

    let album = non_empty(tags.get("album"));
    let artist = non_empty(tags.get("artist").or_else(|| tags.get("album_artist")));
    let album_identifier = ALBUM_IDENTIFIER_SYNONYMS
        .iter()
        .find_map(|key| non_empty(tags.get(*key)));

    Ok(ProbedMetadata {
        codec,
        sample_rate_hz,
        bit_depth,
        bitrate_bps,
        channels,
        lossless,
        album_identifier,
        album,
        artist,
    })
}

fn non_empty(v: Option<&String>) -> Option<String> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lossless_stream_with_tags() {
        let json = r#"{
            "streams": [{
                "codec_type": "audio",
                "codec_name": "flac",
                "sample_rate": "44100",
                "channels": 2,
                "bits_per_raw_sample": "16",
                "tags": {"ALBUM": "Test Album", "ARTIST": "Test Artist", "MUSICBRAINZ_ALBUMID": "abc-123"}
            }],
            "format": {"tags": {}}
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(meta.codec, "flac");
        assert!(meta.lossless);
        assert_eq!(meta.sample_rate_hz, Some(44100));
        assert_eq!(meta.bit_depth, Some(16));
        assert_eq!(meta.album.as_deref(), Some("Test Album"));
        assert_eq!(meta.artist.as_deref(), Some("Test Artist"));
        assert_eq!(meta.album_identifier.as_deref(), Some("abc-123"));
    }

    #[test]
    fn parses_lossy_stream_missing_bit_depth() {
        let json = r#"{
            "streams": [{
                "codec_type": "audio",
                "codec_name": "mp3",
                "sample_rate": "44100",
                "channels": 2,
                "bit_rate": "320000",
                "tags": {}
            }],
            "format": {"bit_rate": "325000", "tags": {}}
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert!(!meta.lossless);
        assert_eq!(meta.bit_depth, None);
        assert_eq!(meta.bitrate_bps, Some(320000));
        assert_eq!(meta.album, None);
        assert_eq!(meta.album_identifier, None);
    }

    #[test]
    fn missing_audio_stream_is_an_error() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "h264"}], "format": {}}"#;
        assert!(parse_probe_json(json).is_err());
    }

    #[test]
    fn blank_tag_values_are_absent_not_empty_string() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "flac", "tags": {"album": "   "}}],
            "format": {"tags": {}}
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(meta.album, None);
    }
}
