//! Scan-result serialization shapes: a nested record-oriented shape and a
//! flat tabular shape, both round-trippable through the apply pipeline.
//! `Item` is the shared per-row projection both shapes are built from and
//! parsed back into.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub path: String,
    pub group_id: u64,
    pub size: u64,
    pub file_size: u64,
    pub quality_score: f64,
    pub quality_string: String,
    pub similarity_to_best: Option<f64>,
    pub match_percentage: Option<f64>,
    pub match_method: Option<String>,
    pub is_best: bool,
    pub recommended_action: String,
    pub format: Option<String>,
    pub codec: Option<String>,
    pub bitrate_bps: Option<u64>,
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u32>,
    pub is_lossless: bool,
    pub track_count: Option<u64>,
    pub album_identifier: Option<String>,
    pub album_name: Option<String>,
    pub artist_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordGroup {
    pub group_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_artist: Option<String>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub groups: Vec<RecordGroup>,
    pub total_groups: u64,
    pub total_duplicates: u64,
}

impl ScanResult {
    pub fn from_items(groups: Vec<RecordGroup>) -> Self {
        let total_groups = groups.len() as u64;
        let total_duplicates = groups.iter().map(|g| g.items.len() as u64).sum();
        ScanResult {
            groups,
            total_groups,
            total_duplicates,
        }
    }

    pub fn all_items(&self) -> impl Iterator<Item = &Item> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    /// Fixed column order for the flat tabular shape.
    const FLAT_HEADER: &'static [&'static str] = &[
        "group_id",
        "path",
        "is_best",
        "recommended_action",
        "quality_score",
        "quality_string",
        "similarity_to_best",
        "match_percentage",
        "match_method",
        "format",
        "codec",
        "bitrate_bps",
        "sample_rate_hz",
        "bit_depth",
        "is_lossless",
        "file_size",
        "track_count",
        "album_identifier",
        "album_name",
        "artist_name",
    ];

    pub fn to_flat_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&Self::FLAT_HEADER.join(","));
        out.push('\n');
        for group in &self.groups {
            for item in &group.items {
                out.push_str(&flat_row(group.group_id, item));
                out.push('\n');
            }
        }
        out
    }

    pub fn from_flat_csv(csv: &str) -> Option<Self> {
        let mut lines = csv.lines();
        let header = lines.next()?;
        if header != Self::FLAT_HEADER.join(",") {
            return None;
        }

        let mut by_group: std::collections::BTreeMap<u64, Vec<Item>> = std::collections::BTreeMap::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != Self::FLAT_HEADER.len() {
                return None;
            }
            let group_id: u64 = fields[0].parse().ok()?;
            let item = Item {
                group_id,
                path: fields[1].to_string(),
                is_best: fields[2] == "true",
                recommended_action: fields[3].to_string(),
                quality_score: fields[4].parse().ok()?,
                quality_string: fields[5].to_string(),
                similarity_to_best: parse_opt(fields[6]),
                match_percentage: parse_opt(fields[7]),
                match_method: non_empty(fields[8]),
                format: non_empty(fields[9]),
                codec: non_empty(fields[10]),
                bitrate_bps: parse_opt(fields[11]),
                sample_rate_hz: parse_opt(fields[12]),
                bit_depth: parse_opt(fields[13]),
                is_lossless: fields[14] == "true",
                size: 0,
                file_size: fields[15].parse().ok()?,
                track_count: parse_opt(fields[16]),
                album_identifier: non_empty(fields[17]),
                album_name: non_empty(fields[18]),
                artist_name: non_empty(fields[19]),
            };
            by_group.entry(group_id).or_default().push(item);
        }

        let groups = by_group
            .into_iter()
            .map(|(group_id, items)| RecordGroup {
                group_id,
                matched_album: items.first().and_then(|i| i.album_name.clone()),
                matched_artist: items.first().and_then(|i| i.artist_name.clone()),
                items,
            })
            .collect();

        Some(ScanResult::from_items(groups))
    }
}

fn flat_row(group_id: u64, item: &Item) -> String {
    [
        group_id.to_string(),
        item.path.clone(),
        item.is_best.to_string(),
        item.recommended_action.clone(),
        item.quality_score.to_string(),
        item.quality_string.clone(),
        opt_string(item.similarity_to_best),
        opt_string(item.match_percentage),
        item.match_method.clone().unwrap_or_default(),
        item.format.clone().unwrap_or_default(),
        item.codec.clone().unwrap_or_default(),
        opt_string(item.bitrate_bps),
        opt_string(item.sample_rate_hz),
        opt_string(item.bit_depth),
        item.is_lossless.to_string(),
        item.file_size.to_string(),
        opt_string(item.track_count),
        item.album_identifier.clone().unwrap_or_default(),
        item.album_name.clone().unwrap_or_default(),
        item.artist_name.clone().unwrap_or_default(),
    ]
    .join(",")
}

fn opt_string<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_opt<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> Item {
        Item {
            path: "/a.flac".to_string(),
            group_id: 1,
            size: 0,
            file_size: 5000,
            quality_score: 11644.1,
            quality_string: "FLAC 44.1kHz 16bit".to_string(),
            similarity_to_best: Some(100.0),
            match_percentage: None,
            match_method: Some("perceptual".to_string()),
            is_best: true,
            recommended_action: "keep".to_string(),
            format: Some("flac".to_string()),
            codec: Some("flac".to_string()),
            bitrate_bps: None,
            sample_rate_hz: Some(44100),
            bit_depth: Some(16),
            is_lossless: true,
            track_count: None,
            album_identifier: None,
            album_name: None,
            artist_name: None,
        }
    }

    #[test]
    fn flat_csv_round_trips_rule_relevant_fields() {
        let result = ScanResult::from_items(vec![RecordGroup {
            group_id: 1,
            matched_album: None,
            matched_artist: None,
            items: vec![sample_item()],
        }]);
        let csv = result.to_flat_csv();
        let parsed = ScanResult::from_flat_csv(&csv).unwrap();
        let original = &result.groups[0].items[0];
        let round_tripped = &parsed.groups[0].items[0];

        assert_eq!(round_tripped.path, original.path);
        assert_eq!(round_tripped.is_best, original.is_best);
        assert_eq!(round_tripped.quality_score, original.quality_score);
        assert_eq!(round_tripped.is_lossless, original.is_lossless);
    }

    #[test]
    fn totals_are_derived_from_groups() {
        let result = ScanResult::from_items(vec![RecordGroup {
            group_id: 1,
            matched_album: None,
            matched_artist: None,
            items: vec![sample_item(), sample_item()],
        }]);
        assert_eq!(result.total_groups, 1);
        assert_eq!(result.total_duplicates, 2);
    }
}
