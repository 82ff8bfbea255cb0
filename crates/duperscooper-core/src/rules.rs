//! Declarative rules engine, in the enum-plus-pure-evaluator shape used
//! throughout `audio_analysis` — rules are plain data, evaluation is a
//! pure function with no side effects, so the apply pipeline can dry-run
//! it freely.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RulesError;
use crate::serialize::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Keep,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Contains,
    MatchesRegex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Path,
    IsBest,
    QualityScore,
    Format,
    Codec,
    Bitrate,
    SampleRate,
    BitDepth,
    IsLossless,
    FileSize,
    SimilarityToBest,
    MatchPercentage,
    MatchMethod,
    TrackCount,
    AlbumIdentifier,
    AlbumName,
    ArtistName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub operator: Operator,
    /// `in`/`not-in` take a list; every other operator takes exactly one.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub priority: i64,
    pub action: Action,
    pub logic: Logic,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub default_action: Action,
}

impl RuleSet {
    /// `eliminate-duplicates`: keep iff `is_best`.
    pub fn eliminate_duplicates() -> Self {
        RuleSet {
            rules: vec![Rule {
                name: "eliminate-duplicates".to_string(),
                priority: 0,
                action: Action::Keep,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::IsBest,
                    operator: Operator::Eq,
                    values: vec!["true".to_string()],
                }],
            }],
            default_action: Action::Delete,
        }
    }

    pub fn keep_lossless() -> Self {
        RuleSet {
            rules: vec![Rule {
                name: "keep-lossless".to_string(),
                priority: 0,
                action: Action::Keep,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::IsLossless,
                    operator: Operator::Eq,
                    values: vec!["true".to_string()],
                }],
            }],
            default_action: Action::Delete,
        }
    }

    pub fn keep_format(format: &str) -> Self {
        RuleSet {
            rules: vec![Rule {
                name: "keep-format".to_string(),
                priority: 0,
                action: Action::Keep,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::Format,
                    operator: Operator::Eq,
                    values: vec![format.to_string()],
                }],
            }],
            default_action: Action::Delete,
        }
    }

    /// Rules sorted by priority descending; first match wins.
    pub fn evaluate(&self, item: &Item) -> Result<Action, RulesError> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        for rule in rules {
            if rule.matches(item)? {
                return Ok(rule.action);
            }
        }
        Ok(self.default_action)
    }
}

impl Rule {
    fn matches(&self, item: &Item) -> Result<bool, RulesError> {
        match self.logic {
            Logic::And => {
                for c in &self.conditions {
                    if !c.evaluate(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Logic::Or => {
                for c in &self.conditions {
                    if c.evaluate(item)? {
                        return Ok(true);
                    }
                }
                Ok(self.conditions.is_empty())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Absent,
}

fn field_value(item: &Item, field: &Field) -> Value {
    match field {
        Field::Path => Value::Text(item.path.clone()),
        Field::IsBest => Value::Bool(item.is_best),
        Field::QualityScore => Value::Number(item.quality_score),
        Field::Format => item.format.clone().map(Value::Text).unwrap_or(Value::Absent),
        Field::Codec => item.codec.clone().map(Value::Text).unwrap_or(Value::Absent),
        Field::Bitrate => item.bitrate_bps.map(|b| Value::Number(b as f64)).unwrap_or(Value::Absent),
        Field::SampleRate => item.sample_rate_hz.map(|s| Value::Number(s as f64)).unwrap_or(Value::Absent),
        Field::BitDepth => item.bit_depth.map(|b| Value::Number(b as f64)).unwrap_or(Value::Absent),
        Field::IsLossless => Value::Bool(item.is_lossless),
        Field::FileSize => Value::Number(item.file_size as f64),
        Field::SimilarityToBest => item.similarity_to_best.map(Value::Number).unwrap_or(Value::Absent),
        Field::MatchPercentage => item.match_percentage.map(Value::Number).unwrap_or(Value::Absent),
        Field::MatchMethod => item.match_method.clone().map(Value::Text).unwrap_or(Value::Absent),
        Field::TrackCount => item.track_count.map(|t| Value::Number(t as f64)).unwrap_or(Value::Absent),
        Field::AlbumIdentifier => item.album_identifier.clone().map(Value::Text).unwrap_or(Value::Absent),
        Field::AlbumName => item.album_name.clone().map(Value::Text).unwrap_or(Value::Absent),
        Field::ArtistName => item.artist_name.clone().map(Value::Text).unwrap_or(Value::Absent),
    }
}

impl Condition {
    /// Absent-field semantics: equality with a non-null value is false,
    /// membership/comparison are false, `!=` is true.
    fn evaluate(&self, item: &Item) -> Result<bool, RulesError> {
        let actual = field_value(item, &self.field);

        if matches!(actual, Value::Absent) {
            return Ok(self.operator == Operator::Ne);
        }

        match self.operator {
            Operator::Eq => Ok(text_of(&actual) == self.values.first().cloned().unwrap_or_default()),
            Operator::Ne => Ok(text_of(&actual) != self.values.first().cloned().unwrap_or_default()),
            Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => self.evaluate_numeric(&actual),
            Operator::In => Ok(self.values.contains(&text_of(&actual))),
            Operator::NotIn => Ok(!self.values.contains(&text_of(&actual))),
            Operator::Contains => Ok(text_of(&actual).contains(self.values.first().map(String::as_str).unwrap_or(""))),
            Operator::MatchesRegex => self.evaluate_regex(&actual),
        }
    }

    fn evaluate_numeric(&self, actual: &Value) -> Result<bool, RulesError> {
        let actual_n = match actual {
            Value::Number(n) => *n,
            _ => return Ok(false),
        };
        let target: f64 = match self.values.first().and_then(|v| v.parse().ok()) {
            Some(n) => n,
            None => return Ok(false),
        };
        Ok(match self.operator {
            Operator::Lt => actual_n < target,
            Operator::Gt => actual_n > target,
            Operator::Le => actual_n <= target,
            Operator::Ge => actual_n >= target,
            _ => unreachable!(),
        })
    }

    fn evaluate_regex(&self, actual: &Value) -> Result<bool, RulesError> {
        let pattern = self.values.first().cloned().unwrap_or_default();
        let re = Regex::new(&pattern).map_err(|source| RulesError::InvalidRegex {
            rule: pattern.clone(),
            source,
        })?;
        Ok(re.is_match(&text_of(actual)))
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Absent => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::Item;

    fn base_item() -> Item {
        Item {
            path: "/a.flac".to_string(),
            group_id: 1,
            size: 1000,
            file_size: 1000,
            quality_score: 11644.1,
            quality_string: "FLAC 44.1kHz 16bit".to_string(),
            similarity_to_best: Some(100.0),
            match_percentage: Some(100.0),
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
    fn eliminate_duplicates_keeps_only_best() {
        let rules = RuleSet::eliminate_duplicates();
        let mut best = base_item();
        best.is_best = true;
        let mut other = base_item();
        other.is_best = false;

        assert_eq!(rules.evaluate(&best).unwrap(), Action::Keep);
        assert_eq!(rules.evaluate(&other).unwrap(), Action::Delete);
    }

    #[test]
    fn absent_field_equality_is_false_but_not_equal_is_true() {
        let rules = RuleSet {
            rules: vec![Rule {
                name: "r".to_string(),
                priority: 0,
                action: Action::Keep,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::AlbumIdentifier,
                    operator: Operator::Eq,
                    values: vec!["abc".to_string()],
                }],
            }],
            default_action: Action::Delete,
        };
        let item = base_item();
        assert_eq!(rules.evaluate(&item).unwrap(), Action::Delete);

        let rules_ne = RuleSet {
            rules: vec![Rule {
                name: "r".to_string(),
                priority: 0,
                action: Action::Keep,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::AlbumIdentifier,
                    operator: Operator::Ne,
                    values: vec!["abc".to_string()],
                }],
            }],
            default_action: Action::Delete,
        };
        assert_eq!(rules_ne.evaluate(&item).unwrap(), Action::Keep);
    }

    #[test]
    fn regex_operator_matches_against_path() {
        let rules = RuleSet {
            rules: vec![Rule {
                name: "r".to_string(),
                priority: 0,
                action: Action::Delete,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: Field::Path,
                    operator: Operator::MatchesRegex,
                    values: vec![r"\.flac$".to_string()],
                }],
            }],
            default_action: Action::Keep,
        };
        assert_eq!(rules.evaluate(&base_item()).unwrap(), Action::Delete);
    }

    #[test]
    fn higher_priority_rule_wins_first_match() {
        let low = Rule {
            name: "low".to_string(),
            priority: 0,
            action: Action::Delete,
            logic: Logic::And,
            conditions: vec![],
        };
        let high = Rule {
            name: "high".to_string(),
            priority: 10,
            action: Action::Keep,
            logic: Logic::Or,
            conditions: vec![],
        };
        let rules = RuleSet {
            rules: vec![low, high],
            default_action: Action::Delete,
        };
        assert_eq!(rules.evaluate(&base_item()).unwrap(), Action::Keep);
    }
}
