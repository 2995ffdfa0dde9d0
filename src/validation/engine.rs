//! Document validation.
//!
//! Pure functions: the same document and rule set always give the same
//! result, and nothing outside the arguments is read or written.

use crate::document::{ConfigDocument, FieldPath};
use crate::validation::result::ValidationResult;
use crate::validation::rules::{RuleSet, MISSING_VALUE};

/// Evaluate every path covered by `rules`.
///
/// Each node matched by a selector gets exactly one outcome; required paths
/// absent from the document fail with "Missing value".
pub fn validate(document: &ConfigDocument, rules: &RuleSet) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (path, value) in document.nodes() {
        if let Some(rule) = rules.rule_for(&path) {
            result.record(path.to_string(), rule.check(value));
        }
    }

    for path in rules.required_paths() {
        if document.get(&path).is_none() {
            result.record(path.to_string(), Some(MISSING_VALUE.to_string()));
        }
    }

    result
}

/// Evaluate a single path. `None` when no rule covers it.
pub fn validate_path(
    document: &ConfigDocument,
    rules: &RuleSet,
    path: &FieldPath,
) -> Option<Option<String>> {
    let rule = rules.rule_for(path)?;
    Some(match document.get(path) {
        Some(value) => rule.check(value),
        None => Some(MISSING_VALUE.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use crate::validation::rules::{EMPTY_PATTERN, POSITIVE, UNIT_INTERVAL};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> ConfigDocument {
        ConfigDocument::from_json(value).unwrap()
    }

    #[test]
    fn test_valid_weight_table() {
        let document = doc(json!({ "weights": { "TAU": 0.5, "other": 0.5 } }));
        let result = validate(&document, &RuleSet::fuser_settings());

        assert!(result.is_savable());
        assert_eq!(result.outcome("weights.TAU"), Some(None));
        assert_eq!(result.outcome("weights.other"), Some(None));
    }

    #[test]
    fn test_settings_errors_per_path() {
        let document = doc(json!({
            "weights": { "W_SRC": 1.01, "TAU": 0 },
            "source_weights": { "reuters": -0.1, "bloomberg": 1 },
            "event_priors": { "acquisition": 0.4 }
        }));
        let result = validate(&document, &RuleSet::fuser_settings());

        assert_eq!(result.error("weights.W_SRC"), Some(UNIT_INTERVAL));
        assert_eq!(result.error("weights.TAU"), Some(POSITIVE));
        assert_eq!(result.error("source_weights.reuters"), Some(UNIT_INTERVAL));
        assert_eq!(result.outcome("source_weights.bloomberg"), Some(None));
        assert_eq!(result.outcome("event_priors.acquisition"), Some(None));
        assert_eq!(result.error_count(), 3);
    }

    #[test]
    fn test_tau_accepts_values_above_one() {
        let document = doc(json!({ "weights": { "TAU": 3600.0 } }));
        assert!(validate(&document, &RuleSet::fuser_settings()).is_savable());
    }

    #[test]
    fn test_missing_tau() {
        let document = doc(json!({ "weights": { "W_SRC": 0.2 } }));
        let result = validate(&document, &RuleSet::fuser_settings());
        assert_eq!(result.error("weights.TAU"), Some(MISSING_VALUE));
    }

    #[test]
    fn test_nan_after_edit() {
        let mut document = doc(json!({ "weights": { "TAU": 1.0, "W_EVT": 0.2 } }));
        document
            .set(&FieldPath::parse("weights.W_EVT").unwrap(), FieldValue::Number(f64::NAN))
            .unwrap();
        let result = validate(&document, &RuleSet::fuser_settings());
        assert_eq!(result.error("weights.W_EVT"), Some(UNIT_INTERVAL));
    }

    #[test]
    fn test_pattern_lists() {
        let document = doc(json!({
            "acquisition": ["acquir(e|ed)", "   "],
            "lawsuit": ["("]
        }));
        let result = validate(&document, &RuleSet::event_patterns());

        assert_eq!(result.outcome("acquisition.0"), Some(None));
        assert_eq!(result.error("acquisition.1"), Some(EMPTY_PATTERN));
        assert!(result.error("lawsuit.0").is_some_and(|m| !m.is_empty()));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_wrong_shape_under_covered_path() {
        let document = doc(json!({ "weights": { "TAU": [1.0] } }));
        let result = validate(&document, &RuleSet::fuser_settings());
        assert_eq!(result.error("weights.TAU"), Some(POSITIVE));
    }

    #[test]
    fn test_deterministic() {
        let document = doc(json!({
            "weights": { "TAU": -1, "W_SRC": 0.3 },
            "source_weights": { "x": 2 }
        }));
        let rules = RuleSet::fuser_settings();
        assert_eq!(validate(&document, &rules), validate(&document, &rules));
    }

    #[test]
    fn test_validate_single_path() {
        let document = doc(json!({ "weights": { "TAU": 0.0 } }));
        let rules = RuleSet::fuser_settings();
        let tau = FieldPath::parse("weights.TAU").unwrap();

        assert_eq!(validate_path(&document, &rules, &tau), Some(Some(POSITIVE.to_string())));
        assert_eq!(validate_path(&document, &rules, &FieldPath::parse("weights").unwrap()), None);
    }
}
