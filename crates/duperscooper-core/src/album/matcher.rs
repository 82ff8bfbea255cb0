//! Album matcher: three strategies, partial-overlap mode, and the
//! confidence model. Shares the `UnionFind` primitive with the track
//! grouper.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Album;
use crate::fingerprint::hamming_similarity;
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Identifier,
    Fingerprint,
    Auto,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub strategy: Strategy,
    pub threshold: f64,
    pub partial: bool,
    pub min_overlap_ratio: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            strategy: Strategy::Auto,
            threshold: 97.0,
            partial: false,
            min_overlap_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroupMember {
    pub index: usize,
    pub confidence: f64,
    pub matched_album: Option<String>,
    pub matched_artist: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumGroup {
    pub members: Vec<AlbumGroupMember>,
}

pub fn match_albums(albums: &[Album], options: MatchOptions) -> Vec<AlbumGroup> {
    match options.strategy {
        Strategy::Identifier => match_by_identifier(albums),
        Strategy::Fingerprint => match_by_fingerprint(albums, options),
        Strategy::Auto => match_auto(albums, options),
    }
}

fn is_canonical(album: &Album) -> bool {
    album.album_identifier.is_some() || (album.album_name.is_some() && album.artist_name.is_some())
}

/// Partition by (identifier, track_count); partitions containing a
/// mixed-identifiers member are excluded regardless of identifier value.
fn match_by_identifier(albums: &[Album]) -> Vec<AlbumGroup> {
    let mut by_key: HashMap<(String, usize), Vec<usize>> = HashMap::new();
    for (i, a) in albums.iter().enumerate() {
        if a.mixed_identifiers {
            continue;
        }
        if let Some(id) = &a.album_identifier {
            by_key.entry((id.clone(), a.track_count)).or_default().push(i);
        }
    }

    let mut groups: Vec<AlbumGroup> = by_key
        .into_values()
        .filter(|indices| indices.len() >= 2)
        .map(|indices| AlbumGroup {
            members: indices
                .into_iter()
                .map(|i| AlbumGroupMember {
                    index: i,
                    confidence: 100.0,
                    matched_album: albums[i].album_name.clone(),
                    matched_artist: albums[i].artist_name.clone(),
                })
                .collect(),
        })
        .collect();
    sort_groups_by_path(albums, &mut groups);
    groups
}

/// `HashMap` iteration order is per-process random, so groups built by
/// partitioning through one are sorted on a stable key afterward — the
/// path of the lowest-indexed member — before being handed back for
/// `group_id` assignment/serialization.
fn sort_groups_by_path(albums: &[Album], groups: &mut [AlbumGroup]) {
    groups.sort_by(|a, b| {
        let a_min = a.members.iter().map(|m| m.index).min().unwrap();
        let b_min = b.members.iter().map(|m| m.index).min().unwrap();
        albums[a_min].path.cmp(&albums[b_min].path)
    });
}

/// Mean of per-track Hamming similarities, tracks sorted by filename
/// within each album first. `None` if track counts are incompatible for
/// the requested mode.
fn album_similarity(a: &Album, b: &Album, partial: bool, min_overlap_ratio: f64) -> Option<f64> {
    let count_a = a.fingerprints.len();
    let count_b = b.fingerprints.len();

    let compare_count = if count_a == count_b {
        count_a
    } else if partial {
        let min_count = count_a.min(count_b);
        let max_count = count_a.max(count_b);
        if max_count == 0 || (min_count as f64 / max_count as f64) < min_overlap_ratio {
            return None;
        }
        min_count
    } else {
        return None;
    };

    if compare_count == 0 {
        return None;
    }

    let mut total = 0.0;
    let mut counted = 0usize;
    for i in 0..compare_count {
        if let (Some(fa), Some(fb)) = (&a.fingerprints[i], &b.fingerprints[i]) {
            if let Some(sim) = hamming_similarity(fa, fb) {
                total += sim;
                counted += 1;
            }
        }
    }
    if counted == 0 {
        return None;
    }
    Some(total / counted as f64)
}

fn match_by_fingerprint(albums: &[Album], options: MatchOptions) -> Vec<AlbumGroup> {
    match_by_fingerprint_subset(albums, &(0..albums.len()).collect::<Vec<_>>(), options)
}

fn match_by_fingerprint_subset(albums: &[Album], subset: &[usize], options: MatchOptions) -> Vec<AlbumGroup> {
    let mut uf = UnionFind::new(albums.len());

    for (ai, &i) in subset.iter().enumerate() {
        for &j in &subset[ai + 1..] {
            if let Some(sim) = album_similarity(&albums[i], &albums[j], options.partial, options.min_overlap_ratio) {
                if sim >= options.threshold {
                    uf.union(i, j);
                }
            }
        }
    }

    let mut by_root: std::collections::BTreeMap<usize, Vec<usize>> = std::collections::BTreeMap::new();
    for &i in subset {
        let root = uf.find(i);
        by_root.entry(root).or_default().push(i);
    }

    let mut groups: Vec<AlbumGroup> = by_root
        .into_values()
        .filter(|g| g.len() >= 2)
        .map(|indices| finalize_fingerprint_group(albums, indices))
        .collect();
    sort_groups_by_path(albums, &mut groups);
    groups
}

fn finalize_fingerprint_group(albums: &[Album], indices: Vec<usize>) -> AlbumGroup {
    let representative = indices
        .iter()
        .max_by_key(|&&i| albums[i].track_count)
        .copied()
        .unwrap();
    let matched_album = albums[representative].album_name.clone();
    let matched_artist = albums[representative].artist_name.clone();

    let members = indices
        .into_iter()
        .map(|i| AlbumGroupMember {
            index: i,
            confidence: confidence_for(&albums[i], matched_album.as_deref(), matched_artist.as_deref(), 100.0),
            matched_album: matched_album.clone(),
            matched_artist: matched_artist.clone(),
        })
        .collect();

    AlbumGroup { members }
}

/// Identifier-matched groups first; among the remaining canonical
/// albums, apply fingerprint matching; finally fold each non-canonical
/// album into the best-fitting canonical group.
fn match_auto(albums: &[Album], options: MatchOptions) -> Vec<AlbumGroup> {
    let mut groups = match_by_identifier(albums);
    let grouped: std::collections::HashSet<usize> =
        groups.iter().flat_map(|g| g.members.iter().map(|m| m.index)).collect();

    let canonical_remaining: Vec<usize> = albums
        .iter()
        .enumerate()
        .filter(|(i, a)| !grouped.contains(i) && is_canonical(a))
        .map(|(i, _)| i)
        .collect();

    let fp_groups = match_by_fingerprint_subset(albums, &canonical_remaining, options);
    let mut newly_grouped: std::collections::HashSet<usize> = std::collections::HashSet::new();
    for g in &fp_groups {
        for m in &g.members {
            newly_grouped.insert(m.index);
        }
    }
    groups.extend(fp_groups);

    let already_grouped: std::collections::HashSet<usize> = grouped.union(&newly_grouped).copied().collect();

    for (i, album) in albums.iter().enumerate() {
        if already_grouped.contains(&i) || is_canonical(album) {
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for group in groups.iter() {
            for member in &group.members {
                if let Some(sim) = album_similarity(album, &albums[member.index], options.partial, options.min_overlap_ratio) {
                    if sim >= options.threshold && best.map(|(_, b)| sim > b).unwrap_or(true) {
                        best = Some((group_index_of(&groups, member.index), sim));
                    }
                }
            }
        }

        if let Some((group_idx, sim)) = best {
            let matched_album = groups[group_idx].members[0].matched_album.clone();
            let matched_artist = groups[group_idx].members[0].matched_artist.clone();
            groups[group_idx].members.push(AlbumGroupMember {
                index: i,
                confidence: confidence_for(album, matched_album.as_deref(), matched_artist.as_deref(), sim),
                matched_album,
                matched_artist,
            });
        }
    }

    groups
}

fn group_index_of(groups: &[AlbumGroup], member_index: usize) -> usize {
    groups
        .iter()
        .position(|g| g.members.iter().any(|m| m.index == member_index))
        .unwrap()
}

/// Confidence model: 100% for identifier matches (callers pass
/// `fingerprint_similarity = 100.0` to signal that path), otherwise 80%
/// base plus tag-agreement bonuses and a linear scale over the 98-100%
/// similarity band.
fn confidence_for(album: &Album, matched_album: Option<&str>, matched_artist: Option<&str>, fingerprint_similarity: f64) -> f64 {
    if album.album_identifier.is_some() {
        return 100.0;
    }

    let mut confidence = 80.0;
    if album.album_name.as_deref() == matched_album && matched_album.is_some() {
        confidence += 5.0;
    }
    if album.artist_name.as_deref() == matched_artist && matched_artist.is_some() {
        confidence += 5.0;
    }
    let band = (fingerprint_similarity - 98.0).clamp(0.0, 2.0) / 2.0;
    confidence += band * 10.0;
    confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use std::path::PathBuf;

    fn album(identifier: Option<&str>, name: Option<&str>, artist: Option<&str>, fps: Vec<Vec<u32>>) -> Album {
        Album {
            path: PathBuf::from("/x"),
            track_indices: (0..fps.len()).collect(),
            track_count: fps.len(),
            total_size: 0,
            average_quality_score: 0.0,
            quality_string: String::new(),
            fingerprints: fps.into_iter().map(|v| Some(Fingerprint::new(v))).collect(),
            album_identifier: identifier.map(String::from),
            mixed_identifiers: false,
            album_name: name.map(String::from),
            artist_name: artist.map(String::from),
            failed_track_count: 0,
        }
    }

    #[test]
    fn identifier_strategy_ignores_mixed_identifier_albums() {
        let a = album(Some("id1"), None, None, vec![vec![1]]);
        let mut b = album(Some("id1"), None, None, vec![vec![1]]);
        b.mixed_identifiers = true;
        let groups = match_by_identifier(&[a, b]);
        assert!(groups.is_empty());
    }

    #[test]
    fn identifier_strategy_groups_matching_ids_and_track_counts() {
        let a = album(Some("id1"), Some("Album"), Some("Artist"), vec![vec![1]]);
        let b = album(Some("id1"), Some("Album"), Some("Artist"), vec![vec![1]]);
        let groups = match_by_identifier(&[a, b]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].members.iter().all(|m| m.confidence == 100.0));
    }

    #[test]
    fn fingerprint_strategy_requires_equal_track_counts_unless_partial() {
        let a = album(None, None, None, vec![vec![1, 2], vec![3, 4]]);
        let b = album(None, None, None, vec![vec![1, 2]]);
        let opts = MatchOptions {
            strategy: Strategy::Fingerprint,
            threshold: 90.0,
            partial: false,
            min_overlap_ratio: 0.5,
        };
        assert!(match_albums(&[a, b], opts).is_empty());
    }

    #[test]
    fn partial_mode_allows_unequal_track_counts_above_overlap_ratio() {
        let a = album(None, None, None, vec![vec![1], vec![2]]);
        let b = album(None, None, None, vec![vec![1]]);
        let opts = MatchOptions {
            strategy: Strategy::Fingerprint,
            threshold: 90.0,
            partial: true,
            min_overlap_ratio: 0.5,
        };
        let groups = match_albums(&[a, b], opts);
        assert_eq!(groups.len(), 1);
    }
}
