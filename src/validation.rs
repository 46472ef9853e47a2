use serde::Deserialize;

use crate::credential::{Credential, CredentialFormat};
use crate::error::{RelayError, Result};

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 1000;

/// Request body of `POST /generate-image` as it arrives on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct RawGenerationInput {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

/// A generation request that passed validation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    credential: Credential,
}

impl GenerationRequest {
    /// Trimmed prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Request validation utilities
#[derive(Debug, Clone)]
pub struct RequestValidator {
    credential_format: CredentialFormat,
    max_prompt_chars: usize,
}

impl RequestValidator {
    pub fn new(credential_format: CredentialFormat, max_prompt_chars: usize) -> Self {
        Self {
            credential_format,
            max_prompt_chars,
        }
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Validates an incoming generation request. Checks run in a fixed order
    /// and stop at the first failure.
    pub fn validate(&self, raw: &RawGenerationInput) -> Result<GenerationRequest> {
        let prompt = raw
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(RelayError::MissingPrompt)?;

        let api_key = raw
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(RelayError::MissingCredential)?;

        if !self.credential_format.matches(api_key) {
            return Err(RelayError::MalformedCredential);
        }

        if prompt.chars().count() > self.max_prompt_chars {
            return Err(RelayError::PromptTooLong {
                max: self.max_prompt_chars,
            });
        }

        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            credential: Credential::new(api_key),
        })
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(CredentialFormat::default(), DEFAULT_MAX_PROMPT_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const KEY: &str = "sk-validformatkeyabcdefgh";

    fn input(prompt: Option<&str>, api_key: Option<&str>) -> RawGenerationInput {
        RawGenerationInput {
            prompt: prompt.map(String::from),
            api_key: api_key.map(String::from),
        }
    }

    fn kind_of(raw: &RawGenerationInput) -> ErrorKind {
        RequestValidator::default().validate(raw).unwrap_err().kind()
    }

    #[test]
    fn test_valid_request_is_trimmed() {
        let request = RequestValidator::default()
            .validate(&input(Some("  a red car \n"), Some(KEY)))
            .unwrap();

        assert_eq!(request.prompt(), "a red car");
        assert_eq!(request.credential().expose(), KEY);
    }

    #[test]
    fn test_missing_prompt_reported_first() {
        assert_eq!(kind_of(&input(None, None)), ErrorKind::MissingPrompt);
        assert_eq!(kind_of(&input(Some("   "), None)), ErrorKind::MissingPrompt);
        assert_eq!(kind_of(&input(Some(""), Some("bogus"))), ErrorKind::MissingPrompt);
    }

    #[test]
    fn test_missing_credential() {
        assert_eq!(kind_of(&input(Some("a car"), None)), ErrorKind::MissingCredential);
        assert_eq!(kind_of(&input(Some("a car"), Some(""))), ErrorKind::MissingCredential);
    }

    #[test]
    fn test_malformed_credential() {
        assert_eq!(
            kind_of(&input(Some("a car"), Some("pk-validformatkeyabcdefgh"))),
            ErrorKind::MalformedCredential
        );
        assert_eq!(kind_of(&input(Some("a car"), Some("sk-short"))), ErrorKind::MalformedCredential);
    }

    #[test]
    fn test_credential_checked_before_prompt_length() {
        let long = "x".repeat(2000);
        assert_eq!(
            kind_of(&input(Some(&long), Some("nope"))),
            ErrorKind::MalformedCredential
        );
    }

    #[test]
    fn test_prompt_length_boundary() {
        let validator = RequestValidator::default();

        let exact = format!("  {}  ", "a".repeat(1000));
        assert!(validator.validate(&input(Some(&exact), Some(KEY))).is_ok());

        let over = "a".repeat(1001);
        let err = validator.validate(&input(Some(&over), Some(KEY))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PromptTooLong);
    }

    #[test]
    fn test_prompt_length_counts_characters() {
        let validator = RequestValidator::default();
        let wide = "é".repeat(1000);
        assert!(validator.validate(&input(Some(&wide), Some(KEY))).is_ok());
    }

    #[test]
    fn test_custom_limits() {
        let validator = RequestValidator::new(CredentialFormat::new("key_", 6), 5);
        assert!(validator.validate(&input(Some("hello"), Some("key_ab"))).is_ok());
        assert_eq!(
            validator.validate(&input(Some("hello!"), Some("key_ab"))).unwrap_err().kind(),
            ErrorKind::PromptTooLong
        );
    }

    #[test]
    fn test_deserialize_wire_names() {
        let raw: RawGenerationInput =
            serde_json::from_str(r#"{"prompt":"a red car","apiKey":"sk-x"}"#).unwrap();
        assert_eq!(raw.prompt.as_deref(), Some("a red car"));
        assert_eq!(raw.api_key.as_deref(), Some("sk-x"));

        let empty: RawGenerationInput = serde_json::from_str("{}").unwrap();
        assert!(empty.prompt.is_none() && empty.api_key.is_none());
    }
}
