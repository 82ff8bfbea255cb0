//! Deterministic quality scoring from probed metadata. Shaped after
//! `audio_analysis::quality` — a pure scoring function plus a
//! human-readable assessment string — with the spectral-cutoff DSP
//! heuristic there replaced by a metadata-only formula (no decoding
//! happens in this crate).

use crate::external::ProbedMetadata;

const DEFAULT_BIT_DEPTH: u32 = 16;
const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
const DEFAULT_BITRATE_BPS: u64 = 0;
const LOSSLESS_OFFSET: f64 = 10_000.0;

/// `10000 + bit_depth·100 + sample_rate_Hz / 1000` for lossless,
/// `bitrate_bits_per_s / 1000` (kbps) for lossy. The lossless offset
/// guarantees any lossless file outranks any lossy one (spec invariant:
/// quality monotonicity).
pub fn quality_score(meta: &ProbedMetadata) -> f64 {
    if meta.lossless {
        let bit_depth = meta.bit_depth.unwrap_or(DEFAULT_BIT_DEPTH) as f64;
        let sample_rate = meta.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ) as f64;
        LOSSLESS_OFFSET + bit_depth * 100.0 + sample_rate / 1000.0
    } else {
        let bitrate = meta.bitrate_bps.unwrap_or(DEFAULT_BITRATE_BPS) as f64;
        bitrate / 1000.0
    }
}

/// Human-readable quality string, e.g. `"FLAC 44.1kHz 16bit"` or
/// `"MP3 CBR 320kbps"`. duperscooper can't distinguish CBR from VBR from
/// metadata alone, so lossy strings always read `"<CODEC> 320kbps"`.
pub fn quality_string(meta: &ProbedMetadata) -> String {
    let codec_upper = meta.codec.to_uppercase();
    if meta.lossless {
        let sample_rate_khz = meta.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ) as f64 / 1000.0;
        let bit_depth = meta.bit_depth.unwrap_or(DEFAULT_BIT_DEPTH);
        format!("{codec_upper} {sample_rate_khz:.1}kHz {bit_depth}bit")
    } else {
        let kbps = meta.bitrate_bps.unwrap_or(DEFAULT_BITRATE_BPS) / 1000;
        format!("{codec_upper} CBR {kbps}kbps")
    }
}

/// An album's aggregate quality string is the average over its tracks,
/// with an `(avg)` suffix. The suffix is carried as a separate boolean
/// flag rather than baked into the string, so presentation layers can
/// place it wherever they prefer.
pub struct AggregateQuality {
    pub score: f64,
    pub formatted: String,
    pub is_average: bool,
}

pub fn aggregate_quality(scores_and_strings: &[(f64, String)]) -> AggregateQuality {
    if scores_and_strings.is_empty() {
        return AggregateQuality {
            score: 0.0,
            formatted: String::new(),
            is_average: false,
        };
    }

    let total: f64 = scores_and_strings.iter().map(|(s, _)| s).sum();
    let avg_score = total / scores_and_strings.len() as f64;

    // Representative string: the formatted string of whichever track sits
    // closest to the average score, ties broken by input order.
    let representative = scores_and_strings
        .iter()
        .min_by(|(a, _), (b, _)| {
            (a - avg_score)
                .abs()
                .partial_cmp(&(b - avg_score).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(_, s)| s.clone())
        .unwrap_or_default();

    AggregateQuality {
        score: avg_score,
        formatted: representative,
        is_average: true,
    }
}
