//! Caller-supplied provider credentials.

use std::fmt;

/// An opaque provider API key. Doubles as the rate limit partition key.
///
/// The raw value is only reachable through [`Credential::expose`]; `Debug`
/// and [`Credential::redacted`] never print the full secret.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short form safe for logs, e.g. `sk-...wxyz`.
    pub fn redacted(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }

        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

/// Structural shape a credential must have before it is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFormat {
    prefix: String,
    min_len: usize,
}

impl CredentialFormat {
    pub fn new(prefix: impl Into<String>, min_len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            min_len,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn matches(&self, raw: &str) -> bool {
        raw.starts_with(&self.prefix) && raw.chars().count() >= self.min_len
    }
}

impl Default for CredentialFormat {
    fn default() -> Self {
        Self::new("sk-", 20)
    }
}
