//! Field rules and per-shape rule sets.

use regex::Regex;

use crate::document::{FieldPath, FieldValue};

pub const EMPTY_PATTERN: &str = "Empty pattern";
pub const NOT_A_PATTERN: &str = "Expected a pattern string";
pub const UNIT_INTERVAL: &str = "Must be between 0 and 1";
pub const POSITIVE: &str = "Must be > 0";
pub const MISSING_VALUE: &str = "Missing value";

/// A predicate over a single field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// A regular expression used later for text matching.
    Pattern,
    /// A finite number in `[0, 1]`.
    UnitInterval,
    /// A finite number strictly greater than 0.
    Positive,
}

impl FieldRule {
    /// `None` when the value passes, otherwise the message to show.
    pub fn check(&self, value: &FieldValue) -> Option<String> {
        match self {
            FieldRule::Pattern => check_pattern(value),
            FieldRule::UnitInterval => match value.as_f64() {
                Some(n) if n.is_finite() && (0.0..=1.0).contains(&n) => None,
                _ => Some(UNIT_INTERVAL.to_string()),
            },
            FieldRule::Positive => match value.as_f64() {
                Some(n) if n.is_finite() && n > 0.0 => None,
                _ => Some(POSITIVE.to_string()),
            },
        }
    }
}

fn check_pattern(value: &FieldValue) -> Option<String> {
    let Some(pattern) = value.as_str() else {
        return Some(NOT_A_PATTERN.to_string());
    };
    if pattern.trim().is_empty() {
        return Some(EMPTY_PATTERN.to_string());
    }
    Regex::new(pattern).err().map(|e| e.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Any,
}

/// Matches field paths segment by segment; `*` matches any single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelector {
    segments: Vec<Segment>,
}

impl PathSelector {
    pub fn new(selector: &str) -> Self {
        let segments = selector
            .split('.')
            .map(|s| match s {
                "*" => Segment::Any,
                key => Segment::Key(key.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &FieldPath) -> bool {
        self.segments.len() == path.len()
            && self.segments.iter().zip(path.segments()).all(|(sel, seg)| match sel {
                Segment::Any => true,
                Segment::Key(key) => key == seg,
            })
    }

    /// The single path this selector names, if it has no wildcard.
    pub fn exact_path(&self) -> Option<FieldPath> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Key(key) => Some(key.clone()),
                Segment::Any => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(FieldPath::from)
    }
}

/// Rules for one document shape. The first selector matching a path decides
/// its rule, so specific selectors go before wildcards.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    rules: Vec<(PathSelector, FieldRule)>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, selector: &str, rule: FieldRule) -> Self {
        self.rules.push((PathSelector::new(selector), rule));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_for(&self, path: &FieldPath) -> Option<FieldRule> {
        self.rules
            .iter()
            .find(|(selector, _)| selector.matches(path))
            .map(|(_, rule)| *rule)
    }

    /// Paths named without wildcards; they must be present in a document.
    pub fn required_paths(&self) -> impl Iterator<Item = FieldPath> + '_ {
        self.rules.iter().filter_map(|(selector, _)| selector.exact_path())
    }

    /// Fuser settings: weight table with a positive `TAU` scale, and
    /// per-source and per-event tables in `[0, 1]`.
    pub fn fuser_settings() -> Self {
        Self::new("fuser_settings")
            .rule("weights.TAU", FieldRule::Positive)
            .rule("weights.*", FieldRule::UnitInterval)
            .rule("source_weights.*", FieldRule::UnitInterval)
            .rule("event_priors.*", FieldRule::UnitInterval)
    }

    /// Event extraction patterns: every entry of every event list is a regex.
    pub fn event_patterns() -> Self {
        Self::new("event_patterns").rule("*.*", FieldRule::Pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_valid_patterns_pass() {
        for pattern in ["acquir(e|es|ed)", r"\bmerger\b", "(?i)guidance cut", "a"] {
            assert_eq!(FieldRule::Pattern.check(&pattern.into()), None, "{pattern}");
        }
    }

    #[test]
    fn test_blank_patterns() {
        for pattern in ["", " ", "\t\n"] {
            assert_eq!(FieldRule::Pattern.check(&pattern.into()).as_deref(), Some(EMPTY_PATTERN));
        }
    }

    #[test]
    fn test_invalid_pattern_reports_diagnostic() {
        let message = FieldRule::Pattern.check(&"(".into()).unwrap();
        assert!(!message.is_empty());
        assert_ne!(message, EMPTY_PATTERN);
        assert!(FieldRule::Pattern.check(&"[a-".into()).is_some());
    }

    #[test]
    fn test_pattern_must_be_text() {
        assert_eq!(FieldRule::Pattern.check(&1.0.into()).as_deref(), Some(NOT_A_PATTERN));
    }

    #[test]
    fn test_unit_interval_bounds() {
        for ok in [0.0, 0.5, 1.0] {
            assert_eq!(FieldRule::UnitInterval.check(&ok.into()), None);
        }
        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            assert_eq!(FieldRule::UnitInterval.check(&bad.into()).as_deref(), Some(UNIT_INTERVAL));
        }
        assert!(FieldRule::UnitInterval.check(&"0.5".into()).is_some());
    }

    #[test]
    fn test_positive_bounds() {
        for ok in [1e-9, 0.5, 1.0, 250.0] {
            assert_eq!(FieldRule::Positive.check(&ok.into()), None);
        }
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(FieldRule::Positive.check(&bad.into()).as_deref(), Some(POSITIVE));
        }
    }

    #[test]
    fn test_first_matching_selector_wins() {
        let rules = RuleSet::fuser_settings();
        assert_eq!(rules.rule_for(&p("weights.TAU")), Some(FieldRule::Positive));
        assert_eq!(rules.rule_for(&p("weights.W_SRC")), Some(FieldRule::UnitInterval));
        assert_eq!(rules.rule_for(&p("weights")), None);
        assert_eq!(rules.rule_for(&p("other.x")), None);
    }

    #[test]
    fn test_required_paths() {
        let required: Vec<_> = RuleSet::fuser_settings().required_paths().map(|p| p.to_string()).collect();
        assert_eq!(required, ["weights.TAU"]);
        assert_eq!(RuleSet::event_patterns().required_paths().count(), 0);
    }
}
