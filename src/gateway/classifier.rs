//! Translation of provider failures into the relay's own error vocabulary.
//!
//! Structured signals win over free text: the provider's error `code` and
//! `type` are checked first, then the HTTP status, and only then the
//! message text. All three tables are plain data and can be loaded from a
//! JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ProviderError;
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailure {
    RateLimited,
    BillingIssue,
    AuthFailed,
    Unknown,
}

/// Matches when any needle is a case-insensitive substring of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub needles: Vec<String>,
    pub failure: ProviderFailure,
}

impl KeywordRule {
    pub fn new(needles: &[&str], failure: ProviderFailure) -> Self {
        Self {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            failure,
        }
    }

    fn matches(&self, haystack_lower: &str) -> bool {
        self.needles
            .iter()
            .any(|needle| haystack_lower.contains(&needle.to_lowercase()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    pub status: u16,
    pub failure: ProviderFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTable {
    #[serde(default)]
    pub codes: Vec<KeywordRule>,
    #[serde(default)]
    pub statuses: Vec<StatusRule>,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self {
            codes: vec![
                KeywordRule::new(&["rate_limit"], ProviderFailure::RateLimited),
                KeywordRule::new(
                    &["insufficient_quota", "billing"],
                    ProviderFailure::BillingIssue,
                ),
                KeywordRule::new(
                    &["invalid_api_key", "invalid_authentication"],
                    ProviderFailure::AuthFailed,
                ),
            ],
            statuses: vec![
                StatusRule { status: 401, failure: ProviderFailure::AuthFailed },
                StatusRule { status: 429, failure: ProviderFailure::RateLimited },
            ],
            keywords: vec![
                KeywordRule::new(&["rate_limit"], ProviderFailure::RateLimited),
                KeywordRule::new(&["billing", "quota"], ProviderFailure::BillingIssue),
                KeywordRule::new(&["authentication"], ProviderFailure::AuthFailed),
            ],
        }
    }
}

impl ClassificationTable {
    /// Load a table from a JSON file. Missing sections are left empty.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            RelayError::Configuration(format!("Invalid error rules in {}: {}", path.display(), e))
        })
    }

    pub fn classify(&self, err: &ProviderError) -> ProviderFailure {
        for structured in [err.code.as_deref(), err.error_type.as_deref()].into_iter().flatten() {
            if let Some(failure) = first_match(&self.codes, structured) {
                return failure;
            }
        }

        if let Some(status) = err.status {
            if let Some(rule) = self.statuses.iter().find(|rule| rule.status == status) {
                return rule.failure;
            }
        }

        first_match(&self.keywords, &err.message).unwrap_or(ProviderFailure::Unknown)
    }
}

fn first_match(rules: &[KeywordRule], text: &str) -> Option<ProviderFailure> {
    let lower = text.to_lowercase();
    rules.iter().find(|rule| rule.matches(&lower)).map(|rule| rule.failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(err: ProviderError) -> ProviderFailure {
        ClassificationTable::default().classify(&err)
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(classify(ProviderError::new("Rate_Limit reached")), ProviderFailure::RateLimited);
        assert_eq!(classify(ProviderError::new("billing hard limit")), ProviderFailure::BillingIssue);
        assert_eq!(classify(ProviderError::new("You exceeded your QUOTA")), ProviderFailure::BillingIssue);
        assert_eq!(
            classify(ProviderError::new("authentication failed")),
            ProviderFailure::AuthFailed
        );
        // rate_limit outranks the others when several appear
        assert_eq!(
            classify(ProviderError::new("authentication rate_limit quota")),
            ProviderFailure::RateLimited
        );
        assert_eq!(classify(ProviderError::new("connection reset")), ProviderFailure::Unknown);
    }

    #[test]
    fn test_structured_code_beats_status() {
        let err = ProviderError {
            status: Some(429),
            code: Some("insufficient_quota".into()),
            error_type: Some("insufficient_quota".into()),
            message: "You exceeded your current quota".into(),
            timed_out: false,
        };
        assert_eq!(classify(err), ProviderFailure::BillingIssue);
    }

    #[test]
    fn test_status_fallback() {
        let err = ProviderError {
            status: Some(401),
            message: "Incorrect API key provided".into(),
            ..Default::default()
        };
        assert_eq!(classify(err), ProviderFailure::AuthFailed);
    }

    #[test]
    fn test_custom_table_from_json() {
        let table: ClassificationTable = serde_json::from_str(
            r#"{"keywords":[{"needles":["overloaded"],"failure":"rate_limited"}]}"#,
        )
        .unwrap();

        assert!(table.codes.is_empty());
        assert_eq!(table.classify(&ProviderError::new("engine overloaded")), ProviderFailure::RateLimited);
        assert_eq!(table.classify(&ProviderError::new("authentication")), ProviderFailure::Unknown);
    }

    #[test]
    fn test_table_loaded_from_file() {
        let path = std::env::temp_dir().join(format!("error-rules-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "codes": [{"needles": ["server_busy"], "failure": "rate_limited"}],
                "statuses": [{"status": 402, "failure": "billing_issue"}]
            }"#,
        )
        .unwrap();

        let table = ClassificationTable::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(table.codes.len(), 1);
        assert!(table.keywords.is_empty());

        let busy = ProviderError {
            code: Some("server_busy".into()),
            message: "try later".into(),
            ..Default::default()
        };
        assert_eq!(table.classify(&busy), ProviderFailure::RateLimited);

        let payment = ProviderError {
            status: Some(402),
            message: "payment required".into(),
            ..Default::default()
        };
        assert_eq!(table.classify(&payment), ProviderFailure::BillingIssue);

        // No keyword rules were loaded, so free text falls through.
        assert_eq!(table.classify(&ProviderError::new("authentication failed")), ProviderFailure::Unknown);
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let path = std::env::temp_dir().join(format!("error-rules-bad-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"keywords": [{"needles": "oops"}]}"#).unwrap();

        let err = ClassificationTable::from_json_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = ClassificationTable::from_json_file(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }
}
