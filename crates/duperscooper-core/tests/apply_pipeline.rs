//! End-to-end rules/apply/staging round-trip, independent of the external
//! fingerprinter and probe tools (exercises the exact-hash path only,
//! which needs no external process).

use duperscooper_core::apply::{execute, plan};
use duperscooper_core::rules::RuleSet;
use duperscooper_core::serialize::{Item, RecordGroup, ScanResult};
use duperscooper_core::staging::{Mode, StagingEngine};
use tempfile::tempdir;

fn item(path: &str, is_best: bool) -> Item {
    Item {
        path: path.to_string(),
        group_id: 1,
        size: 1000,
        file_size: 1000,
        quality_score: if is_best { 11644.1 } else { 320.0 },
        quality_string: "x".to_string(),
        similarity_to_best: Some(if is_best { 100.0 } else { 95.0 }),
        match_percentage: None,
        match_method: Some("exact".to_string()),
        is_best,
        recommended_action: if is_best { "keep".to_string() } else { "delete".to_string() },
        format: Some("flac".to_string()),
        codec: Some("flac".to_string()),
        bitrate_bps: None,
        sample_rate_hz: Some(44_100),
        bit_depth: Some(16),
        is_lossless: is_best,
        track_count: None,
        album_identifier: None,
        album_name: None,
        artist_name: None,
    }
}

#[test]
fn duplicate_group_is_planned_and_staged_then_restored() {
    let root = tempdir().unwrap();
    let best_path = root.path().join("best.flac");
    let other_path = root.path().join("other.mp3");
    std::fs::write(&best_path, b"lossless bytes").unwrap();
    std::fs::write(&other_path, b"lossy bytes").unwrap();

    let scan_result = ScanResult::from_items(vec![RecordGroup {
        group_id: 1,
        matched_album: None,
        matched_artist: None,
        items: vec![
            item(best_path.to_str().unwrap(), true),
            item(other_path.to_str().unwrap(), false),
        ],
    }]);

    let rules = RuleSet::eliminate_duplicates();
    let report = plan(&scan_result, &rules).unwrap();
    assert_eq!(report.total_marked, 1);
    assert!(report.overrides.is_empty());

    let engine = StagingEngine::new(root.path());
    let batch_id = execute(&scan_result, &report, &engine, Mode::Track).unwrap();

    assert!(best_path.exists());
    assert!(!other_path.exists());

    engine.restore(batch_id).unwrap();
    assert!(other_path.exists());
    assert_eq!(std::fs::read(&other_path).unwrap(), b"lossy bytes");
}

#[test]
fn scan_result_round_trips_through_flat_csv_and_back_into_apply() {
    let scan_result = ScanResult::from_items(vec![RecordGroup {
        group_id: 1,
        matched_album: None,
        matched_artist: None,
        items: vec![item("/a.flac", true), item("/b.mp3", false)],
    }]);

    let csv = scan_result.to_flat_csv();
    let parsed = ScanResult::from_flat_csv(&csv).expect("flat csv must parse back");

    let rules = RuleSet::eliminate_duplicates();
    let report = plan(&parsed, &rules).unwrap();
    assert_eq!(report.total_marked, 1);
}
