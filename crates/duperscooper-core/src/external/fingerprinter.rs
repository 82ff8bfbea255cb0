use std::io;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::FingerprintError;
use crate::fingerprint::Fingerprint;

/// Wraps an external fingerprinting tool (by default `fpcalc`, Chromaprint's
/// CLI). Invoked with `-raw` so it emits integers directly instead of the
/// base64-encoded compressed form.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    binary: String,
}

#[derive(Debug, Deserialize)]
struct RawJsonOutput {
    fingerprint: Vec<u32>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Fingerprinter {
            binary: "fpcalc".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Fingerprinter { binary: binary.into() }
    }

    /// `true` iff the configured binary can be invoked at all. Tool
    /// absence is treated as a hard, user-actionable error at the start
    /// of any operation requiring it.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        if !path.is_file() {
            return Err(FingerprintError::Unreadable(path.to_path_buf()));
        }

        let output = Command::new(&self.binary)
            .arg("-raw")
            .arg(path)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FingerprintError::ToolMissing(self.binary.clone()),
                _ => FingerprintError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(FingerprintError::ToolError(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_raw_fingerprint(&stdout)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts either the `FINGERPRINT=1,2,3` line format or a JSON document
/// with a `fingerprint` array — real fpcalc builds support both depending
/// on how they were configured at build time.
fn parse_raw_fingerprint(stdout: &str) -> Result<Fingerprint, FingerprintError> {
    let trimmed = stdout.trim_start();
    if trimmed.starts_with('{') {
        let parsed: RawJsonOutput =
            serde_json::from_str(trimmed).map_err(|e| FingerprintError::ParseError(e.to_string()))?;
        return Ok(Fingerprint::new(parsed.fingerprint));
    }

    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("FINGERPRINT=") {
            let values: Result<Vec<u32>, _> = rest.split(',').map(|n| n.trim().parse::<u32>()).collect();
            return values
                .map(Fingerprint::new)
                .map_err(|e| FingerprintError::ParseError(e.to_string()));
        }
    }

    Err(FingerprintError::ParseError(
        "no FINGERPRINT= line or JSON fingerprint field in tool output".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_form() {
        let fp = parse_raw_fingerprint("DURATION=120\nFINGERPRINT=1,2,3,4294967295\n").unwrap();
        assert_eq!(fp.0, vec![1, 2, 3, u32::MAX]);
    }

    #[test]
    fn parses_json_form() {
        let fp = parse_raw_fingerprint(r#"{"duration":120,"fingerprint":[1,2,3]}"#).unwrap();
        assert_eq!(fp.0, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_garbage_output() {
        assert!(parse_raw_fingerprint("not a fingerprint").is_err());
    }
}
