//! Generation gateway
//!
//! Calls the external image provider with a validated request and maps
//! whatever comes back onto [`GeneratedImage`] or a [`RelayError`].

pub mod classifier;
pub mod openai;

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::error::RelayError;
use crate::validation::GenerationRequest;

pub use classifier::{ClassificationTable, ProviderFailure};
pub use openai::OpenAiImageProvider;

pub type GenerationResult = Result<GeneratedImage, RelayError>;

static CREDENTIAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[A-Za-z0-9_\-*]{4,}").expect("credential pattern is valid"));

/// Fixed generation parameters sent with every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageParams {
    pub model: String,
    pub n: u8,
    pub size: String,
    pub quality: String,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            model: "dall-e-3".to_string(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
        }
    }
}

/// One image reference returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderImage {
    pub url: Option<String>,
    pub revised_prompt: Option<String>,
}

/// A failed provider call, with whatever structure the provider gave us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub error_type: Option<String>,
    pub message: String,
    pub timed_out: bool,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Runs one generation call authenticated with `credential`.
    async fn generate_images(
        &self,
        credential: &Credential,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<Vec<ProviderImage>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub image_url: String,
    pub prompt: String,
}

pub struct GenerationGateway {
    provider: Arc<dyn ImageProvider>,
    classifier: ClassificationTable,
    params: ImageParams,
    timeout: Duration,
}

impl GenerationGateway {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        classifier: ClassificationTable,
        params: ImageParams,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            classifier,
            params,
            timeout,
        }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let call = self
            .provider
            .generate_images(request.credential(), request.prompt(), &self.params);

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    credential = %request.credential().redacted(),
                    timeout = ?self.timeout,
                    "Provider call timed out"
                );
                return Err(self.timeout_error());
            }
        };

        let images = outcome.map_err(|err| self.translate(err, request.credential()))?;

        let first = images.into_iter().next().ok_or_else(|| {
            RelayError::ProviderUnknown("provider returned no images".to_string())
        })?;

        if let Some(revised) = &first.revised_prompt {
            debug!(revised_prompt = %revised, "Provider revised the prompt");
        }

        let image_url = first.url.ok_or_else(|| {
            RelayError::ProviderUnknown("provider returned an image without a URL".to_string())
        })?;

        Ok(GeneratedImage {
            image_url,
            prompt: request.prompt().to_string(),
        })
    }

    fn translate(&self, err: ProviderError, credential: &Credential) -> RelayError {
        if err.timed_out {
            return self.timeout_error();
        }

        let failure = self.classifier.classify(&err);
        let detail = provider_detail(&err.message, credential);
        warn!(
            status = ?err.status,
            code = ?err.code,
            failure = ?failure,
            "Provider call failed: {}",
            detail
        );

        match failure {
            ProviderFailure::RateLimited => RelayError::ProviderRateLimited,
            ProviderFailure::BillingIssue => RelayError::ProviderBillingIssue,
            ProviderFailure::AuthFailed => RelayError::ProviderAuthFailed,
            ProviderFailure::Unknown => RelayError::ProviderUnknown(detail),
        }
    }

    fn timeout_error(&self) -> RelayError {
        RelayError::ProviderTimeout(
            humantime_serde::re::humantime::format_duration(self.timeout).to_string(),
        )
    }
}

const MAX_DETAIL_CHARS: usize = 200;

/// Masks the caller's own key wherever it appears, then anything else
/// shaped like a provider key.
pub fn redact_credentials(text: &str, credential: &Credential) -> String {
    let text = match credential.expose() {
        "" => text.to_string(),
        raw => text.replace(raw, &credential.redacted()),
    };
    CREDENTIAL_PATTERN.replace_all(&text, "sk-***").into_owned()
}

/// Provider message made safe for a response body: redacted and bounded.
pub fn provider_detail(text: &str, credential: &Credential) -> String {
    let redacted = redact_credentials(text, credential);
    if redacted.chars().count() <= MAX_DETAIL_CHARS {
        return redacted;
    }
    let head: String = redacted.chars().take(MAX_DETAIL_CHARS).collect();
    format!("{}...", head)
}
