//! The fingerprint data model: an ordered sequence of unsigned 32-bit
//! integers, and the Hamming-similarity comparison over it (see spec
//! GLOSSARY "Fingerprint", "Hamming similarity").

use serde::{Deserialize, Serialize};

/// Raw acoustic fingerprint produced by the external fingerprinter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<u32>);

impl Fingerprint {
    pub fn new(data: Vec<u32>) -> Self {
        Fingerprint(data)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Comma-separated integer list, the cache's on-disk representation.
    pub fn to_csv(&self) -> String {
        self.0.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
    }

    pub fn from_csv(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(Fingerprint(Vec::new()));
        }
        let mut out = Vec::with_capacity(s.matches(',').count() + 1);
        for part in s.split(',') {
            out.push(part.parse().ok()?);
        }
        Some(Fingerprint(out))
    }
}

/// Hamming similarity, expressed as a percentage in `[0, 100]`, over the
/// common prefix of two fingerprints. Returns `None` when the common
/// prefix is empty (undefined similarity — the pair induces no edge).
///
/// `similarity(f, f) == 100.0` and `similarity(f, g) == similarity(g, f)`
/// for any non-empty common prefix.
pub fn hamming_similarity(a: &Fingerprint, b: &Fingerprint) -> Option<f64> {
    let len = a.0.len().min(b.0.len());
    if len == 0 {
        return None;
    }

    let mut differing_bits: u64 = 0;
    for i in 0..len {
        differing_bits += (a.0[i] ^ b.0[i]).count_ones() as u64;
    }

    let total_bits = (len as u64) * 32;
    Some(100.0 * (1.0 - differing_bits as f64 / total_bits as f64))
}
