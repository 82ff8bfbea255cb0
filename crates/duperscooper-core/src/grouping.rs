//! Duplicate grouper: exact hash-partition mode and fuzzy Hamming +
//! union–find mode, sharing tie-breaking and best-member selection.
//! Built in the pure-function scoring style of `quality.rs`, on top of
//! the crate-local `union_find` primitive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fingerprint::hamming_similarity;
use crate::scanner::{Algorithm, TrackRecord};
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    Keep,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub index: usize,
    pub similarity_to_best: f64,
    pub is_best: bool,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub members: Vec<GroupMember>,
}

pub fn group_tracks(tracks: &[TrackRecord], algorithm: Algorithm, threshold: f64) -> Vec<DuplicateGroup> {
    let threshold = threshold.clamp(0.0, 100.0);
    let mut groups = match algorithm {
        Algorithm::Exact => group_exact(tracks),
        Algorithm::Perceptual => group_fuzzy(tracks, threshold),
    };
    // Both `by_hash.into_values()` and `UnionFind::groups()` may visit
    // components in an order that isn't a function of track content alone;
    // sort on the best member's path so identical inputs always serialize
    // to the same group order regardless of hash-map iteration order.
    groups.sort_by(|a, b| tracks[best_member(a).index].path.cmp(&tracks[best_member(b).index].path));
    groups
}

fn best_member(group: &DuplicateGroup) -> &GroupMember {
    group.members.iter().find(|m| m.is_best).expect("every group has exactly one best member")
}

fn group_exact(tracks: &[TrackRecord]) -> Vec<DuplicateGroup> {
    let mut by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, t) in tracks.iter().enumerate() {
        by_hash.entry(t.content_hash.as_str()).or_default().push(i);
    }

    by_hash
        .into_values()
        .filter(|indices| indices.len() >= 2)
        .map(|indices| finalize_group(tracks, indices))
        .collect()
}

fn group_fuzzy(tracks: &[TrackRecord], threshold: f64) -> Vec<DuplicateGroup> {
    let mut uf = UnionFind::new(tracks.len());

    let fingerprinted: Vec<usize> = tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.fingerprint.as_ref().is_some_and(|f| !f.is_empty()))
        .map(|(i, _)| i)
        .collect();

    for (ai, &i) in fingerprinted.iter().enumerate() {
        for &j in &fingerprinted[ai + 1..] {
            let fi = tracks[i].fingerprint.as_ref().unwrap();
            let fj = tracks[j].fingerprint.as_ref().unwrap();
            if let Some(sim) = hamming_similarity(fi, fj) {
                if sim >= threshold {
                    uf.union(i, j);
                }
            }
        }
    }

    uf.groups().into_iter().map(|indices| finalize_group(tracks, indices)).collect()
}

/// Best = max quality score, ties by lexicographic path; others sorted by
/// descending similarity to best, ties lexicographic.
fn finalize_group(tracks: &[TrackRecord], mut indices: Vec<usize>) -> DuplicateGroup {
    indices.sort_by(|&a, &b| tracks[a].path.cmp(&tracks[b].path));

    let best_index = *indices
        .iter()
        .max_by(|&&a, &&b| {
            tracks[a]
                .quality_score
                .partial_cmp(&tracks[b].quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| tracks[b].path.cmp(&tracks[a].path))
        })
        .unwrap();

    let best_fp = tracks[best_index].fingerprint.as_ref();

    let mut members: Vec<GroupMember> = indices
        .into_iter()
        .map(|i| {
            let is_best = i == best_index;
            let similarity = if is_best {
                100.0
            } else {
                match (best_fp, tracks[i].fingerprint.as_ref()) {
                    (Some(a), Some(b)) => hamming_similarity(a, b).unwrap_or(0.0),
                    _ => {
                        if tracks[i].content_hash == tracks[best_index].content_hash {
                            100.0
                        } else {
                            0.0
                        }
                    }
                }
            };
            GroupMember {
                index: i,
                similarity_to_best: similarity,
                is_best,
                recommended_action: if is_best {
                    RecommendedAction::Keep
                } else {
                    RecommendedAction::Delete
                },
            }
        })
        .collect();

    members.sort_by(|a, b| {
        if a.is_best {
            return std::cmp::Ordering::Less;
        }
        if b.is_best {
            return std::cmp::Ordering::Greater;
        }
        b.similarity_to_best
            .partial_cmp(&a.similarity_to_best)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| tracks[a.index].path.cmp(&tracks[b.index].path))
    });

    DuplicateGroup { members }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use std::path::PathBuf;

    fn track(path: &str, hash: &str, fp: Option<Vec<u32>>, score: f64) -> TrackRecord {
        TrackRecord {
            path: PathBuf::from(path),
            size: 1000,
            content_hash: hash.to_string(),
            fingerprint: fp.map(Fingerprint::new),
            codec: "flac".to_string(),
            sample_rate_hz: Some(44100),
            bit_depth: Some(16),
            bitrate_bps: None,
            channels: Some(2),
            lossless: true,
            quality_score: score,
            quality_string: "FLAC 44.1kHz 16bit".to_string(),
            album: None,
            artist: None,
            album_identifier: None,
        }
    }

    #[test]
    fn exact_mode_groups_identical_hashes() {
        let tracks = vec![
            track("/a.flac", "h1", None, 11644.1),
            track("/b.flac", "h1", None, 11644.1),
            track("/c.flac", "h2", None, 11644.1),
        ];
        let groups = group_tracks(&tracks, Algorithm::Exact, 97.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn fuzzy_mode_picks_highest_quality_as_best() {
        let tracks = vec![
            track("/a.flac", "h1", Some(vec![1, 2, 3]), 320.0),
            track("/b.flac", "h2", Some(vec![1, 2, 3]), 11644.1),
        ];
        let groups = group_tracks(&tracks, Algorithm::Perceptual, 50.0);
        assert_eq!(groups.len(), 1);
        let best = groups[0].members.iter().find(|m| m.is_best).unwrap();
        assert_eq!(best.index, 1);
    }

    #[test]
    fn below_threshold_pairs_do_not_group() {
        let tracks = vec![
            track("/a.flac", "h1", Some(vec![0x0000_0000]), 1.0),
            track("/b.flac", "h2", Some(vec![0xFFFF_FFFF]), 1.0),
        ];
        let groups = group_tracks(&tracks, Algorithm::Perceptual, 97.0);
        assert!(groups.is_empty());
    }

    #[test]
    fn tracks_without_fingerprints_are_excluded_from_fuzzy_grouping() {
        let tracks = vec![
            track("/a.flac", "h1", Some(vec![1, 2, 3]), 1.0),
            track("/b.flac", "h2", None, 1.0),
        ];
        let groups = group_tracks(&tracks, Algorithm::Perceptual, 0.0);
        assert!(groups.is_empty());
    }
}
