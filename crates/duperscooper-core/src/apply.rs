//! Apply pipeline: evaluate rules over a loaded scan result, build a
//! deletion report, and either stop (dry-run) or stage the marked items
//! through the staging engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApplyError;
use crate::rules::{Action, RuleSet};
use crate::serialize::{Item, ScanResult};
use crate::staging::{hash_file, Mode, StagingEngine};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPreview {
    pub group_id: u64,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionReport {
    pub groups: Vec<GroupPreview>,
    pub total_marked: u64,
    pub total_bytes_marked: u64,
    pub overrides: Vec<String>,
}

pub fn plan(scan_result: &ScanResult, rules: &RuleSet) -> Result<DeletionReport, ApplyError> {
    let mut groups = Vec::with_capacity(scan_result.groups.len());
    let mut total_marked = 0u64;
    let mut total_bytes_marked = 0u64;
    let mut overrides = Vec::new();

    for group in &scan_result.groups {
        let mut decisions: Vec<(&Item, Action)> = Vec::with_capacity(group.items.len());
        for item in &group.items {
            decisions.push((item, rules.evaluate(item)?));
        }

        // Never mark every item in a group for deletion: if a rule
        // configuration would, override by keeping the best item instead.
        if !decisions.is_empty() && decisions.iter().all(|(_, a)| *a == Action::Delete) {
            if let Some(pos) = decisions.iter().position(|(item, _)| item.is_best) {
                decisions[pos].1 = Action::Keep;
            } else {
                decisions[0].1 = Action::Keep;
            }
            let warning = format!("group {} would have deleted every item; kept one to avoid total loss", group.group_id);
            warn!("{warning}");
            overrides.push(warning);
        }

        let mut kept = Vec::new();
        let mut deleted = Vec::new();
        for (item, action) in decisions {
            match action {
                Action::Keep => kept.push(item.path.clone()),
                Action::Delete => {
                    deleted.push(item.path.clone());
                    total_marked += 1;
                    total_bytes_marked += item.file_size;
                }
            }
        }

        groups.push(GroupPreview {
            group_id: group.group_id,
            kept,
            deleted,
        });
    }

    Ok(DeletionReport {
        groups,
        total_marked,
        total_bytes_marked,
        overrides,
    })
}

/// Executes a previously planned report by staging every marked item in a
/// single batch, one staging call per apply invocation. Each item's
/// content hash is computed from the file on disk right before it's
/// staged — the staging manifest needs the real pre-move hash so restore
/// can verify staged bytes against it, and the file is still in place to
/// hash at this point.
pub fn execute(
    scan_result: &ScanResult,
    report: &DeletionReport,
    engine: &StagingEngine,
    mode: Mode,
) -> Result<uuid::Uuid, ApplyError> {
    let marked_paths: std::collections::HashSet<&str> =
        report.groups.iter().flat_map(|g| g.deleted.iter().map(String::as_str)).collect();

    let mut items = Vec::new();
    for item in scan_result.all_items() {
        if marked_paths.contains(item.path.as_str()) {
            let path = PathBuf::from(&item.path);
            let hash = hash_file(&path)?;
            items.push((path, hash, item.file_size));
        }
    }

    engine.stage(&items, mode).map_err(ApplyError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::RecordGroup;

    fn item(path: &str, is_best: bool, file_size: u64) -> Item {
        Item {
            path: path.to_string(),
            group_id: 1,
            size: file_size,
            file_size,
            quality_score: if is_best { 11644.1 } else { 320.0 },
            quality_string: "x".to_string(),
            similarity_to_best: Some(if is_best { 100.0 } else { 98.0 }),
            match_percentage: None,
            match_method: None,
            is_best,
            recommended_action: if is_best { "keep".to_string() } else { "delete".to_string() },
            format: Some("flac".to_string()),
            codec: Some("flac".to_string()),
            bitrate_bps: None,
            sample_rate_hz: None,
            bit_depth: None,
            is_lossless: is_best,
            track_count: None,
            album_identifier: None,
            album_name: None,
            artist_name: None,
        }
    }

    #[test]
    fn plan_marks_non_best_items_for_deletion() {
        let scan = ScanResult::from_items(vec![RecordGroup {
            group_id: 1,
            matched_album: None,
            matched_artist: None,
            items: vec![item("/best.flac", true, 1000), item("/other.mp3", false, 500)],
        }]);
        let rules = RuleSet::eliminate_duplicates();
        let report = plan(&scan, &rules).unwrap();
        assert_eq!(report.total_marked, 1);
        assert_eq!(report.groups[0].deleted, vec!["/other.mp3".to_string()]);
        assert!(report.overrides.is_empty());
    }

    #[test]
    fn plan_never_deletes_every_item_in_a_group() {
        let scan = ScanResult::from_items(vec![RecordGroup {
            group_id: 1,
            matched_album: None,
            matched_artist: None,
            items: vec![item("/best.flac", true, 1000), item("/other.mp3", false, 500)],
        }]);
        let rules = RuleSet {
            rules: vec![],
            default_action: Action::Delete,
        };
        let report = plan(&scan, &rules).unwrap();
        assert_eq!(report.total_marked, 1);
        assert_eq!(report.groups[0].kept.len(), 1);
        assert_eq!(report.overrides.len(), 1);
    }
}
