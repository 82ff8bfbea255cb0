//! Album aggregate and directory-level discovery. Follows the same
//! `group_key`-by-directory aggregation shape as `scanner.rs`, repurposed
//! for the album rollup instead of device grouping.

pub mod matcher;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::quality::{aggregate_quality, AggregateQuality};
use crate::scanner::TrackRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub path: PathBuf,
    pub track_indices: Vec<usize>,
    pub track_count: usize,
    pub total_size: u64,
    pub average_quality_score: f64,
    pub quality_string: String,
    pub fingerprints: Vec<Option<Fingerprint>>,
    pub album_identifier: Option<String>,
    pub mixed_identifiers: bool,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
    pub failed_track_count: usize,
}

/// Non-recursive directory-level discovery: every distinct parent
/// directory among the already-scanned tracks becomes one Album. Children
/// of an Album directory are never themselves scanned as a nested Album.
pub fn build_albums(tracks: &[TrackRecord]) -> Vec<Album> {
    let mut by_dir: HashMap<PathBuf, Vec<usize>> = HashMap::new();
    for (i, t) in tracks.iter().enumerate() {
        let dir = t.path.parent().map(PathBuf::from).unwrap_or_default();
        by_dir.entry(dir).or_default().push(i);
    }

    let mut dirs: Vec<PathBuf> = by_dir.keys().cloned().collect();
    dirs.sort();

    dirs.into_iter()
        .map(|dir| {
            let indices = by_dir.remove(&dir).unwrap();
            build_one(dir, indices, tracks)
        })
        .collect()
}

fn build_one(path: PathBuf, indices: Vec<usize>, tracks: &[TrackRecord]) -> Album {
    let total_size = indices.iter().map(|&i| tracks[i].size).sum();

    let scores_and_strings: Vec<(f64, String)> = indices
        .iter()
        .map(|&i| (tracks[i].quality_score, tracks[i].quality_string.clone()))
        .collect();
    let AggregateQuality { score, formatted, .. } = aggregate_quality(&scores_and_strings);

    let fingerprints = indices.iter().map(|&i| tracks[i].fingerprint.clone()).collect();

    let (album_identifier, mixed_identifiers) =
        consensus_identifier(indices.iter().map(|&i| tracks[i].album_identifier.as_deref()));
    let (album_name, _) = consensus_value(indices.iter().map(|&i| tracks[i].album.as_deref()));
    let (artist_name, _) = consensus_value(indices.iter().map(|&i| tracks[i].artist.as_deref()));

    let failed_track_count = indices.iter().filter(|&&i| tracks[i].fingerprint.is_none()).count();

    Album {
        path,
        track_count: indices.len(),
        track_indices: indices,
        total_size,
        average_quality_score: score,
        quality_string: format!("{formatted} (avg)"),
        fingerprints,
        album_identifier,
        mixed_identifiers,
        album_name,
        artist_name,
        failed_track_count,
    }
}

/// Most-common non-empty value, ties broken by first occurrence. Returns
/// the winner and whether more than one distinct non-empty value was
/// observed.
fn consensus_value<'a>(values: impl Iterator<Item = Option<&'a str>>) -> (Option<String>, bool) {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for v in values.flatten().filter(|s| !s.is_empty()) {
        match counts.iter_mut().find(|(existing, _)| *existing == v) {
            Some((_, count)) => *count += 1,
            None => counts.push((v, 1)),
        }
    }
    let distinct = counts.len() > 1;
    // `counts` is already in first-occurrence order; fold left-to-right so
    // an earlier value wins ties over a later one with the same count.
    let winner = counts
        .into_iter()
        .fold(None, |acc: Option<(&str, usize)>, (v, count)| match acc {
            Some((_, best_count)) if best_count >= count => acc,
            _ => Some((v, count)),
        })
        .map(|(v, _)| v.to_string());
    (winner, distinct)
}

/// Identifier consensus follows a stricter rule than name/artist consensus:
/// *any* disagreement nulls the field and sets `mixed_identifiers`, rather
/// than picking a majority winner.
fn consensus_identifier<'a>(values: impl Iterator<Item = Option<&'a str>>) -> (Option<String>, bool) {
    let mut distinct: Vec<&str> = Vec::new();
    for v in values.flatten().filter(|s| !s.is_empty()) {
        if !distinct.contains(&v) {
            distinct.push(v);
        }
    }
    match distinct.len() {
        0 => (None, false),
        1 => (Some(distinct[0].to_string()), false),
        _ => (None, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_distinct_identifier_is_not_mixed() {
        let (id, mixed) = consensus_identifier(vec![Some("abc"), Some("abc"), None].into_iter());
        assert_eq!(id.as_deref(), Some("abc"));
        assert!(!mixed);
    }

    #[test]
    fn disagreeing_identifiers_null_and_flag_mixed() {
        let (id, mixed) = consensus_identifier(vec![Some("abc"), Some("def")].into_iter());
        assert_eq!(id, None);
        assert!(mixed);
    }

    #[test]
    fn name_consensus_picks_majority_not_strict_agreement() {
        let (name, distinct) = consensus_value(vec![Some("A"), Some("A"), Some("B")].into_iter());
        assert_eq!(name.as_deref(), Some("A"));
        assert!(distinct);
    }

    #[test]
    fn all_absent_yields_no_consensus() {
        let (id, mixed) = consensus_identifier(vec![None, None].into_iter());
        assert_eq!(id, None);
        assert!(!mixed);
    }
}
