//! OpenAI images API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ImageParams, ImageProvider, ProviderError, ProviderImage};
use crate::credential::Credential;
use crate::error::{RelayError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Calls `POST {base_url}/images/generations`.
///
/// The connection pool is shared; the bearer token is set per call so no
/// credential outlives the request that supplied it.
pub struct OpenAiImageProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ImageGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

impl OpenAiImageProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Image provider configured: base_url={}", base_url);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate_images(
        &self,
        credential: &Credential,
        prompt: &str,
        params: &ImageParams,
    ) -> std::result::Result<Vec<ProviderImage>, ProviderError> {
        let body = ImageGenerationBody {
            model: &params.model,
            prompt,
            n: params.n,
            size: &params.size,
            quality: &params.quality,
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = %status, bytes = text.len(), "Provider responded");

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let parsed: ImageGenerationResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(format!("malformed provider response: {}", e)))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|d| ProviderImage {
                url: d.url,
                revised_prompt: d.revised_prompt,
            })
            .collect())
    }
}

fn parse_error_body(status: u16, text: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => ProviderError {
            status: Some(status),
            code: envelope.error.code,
            error_type: envelope.error.error_type,
            message: envelope.error.message,
            timed_out: false,
        },
        Err(_) => ProviderError {
            status: Some(status),
            message: if text.is_empty() {
                format!("provider returned status {}", status)
            } else {
                text.to_string()
            },
            ..Default::default()
        },
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError {
            status: err.status().map(|s| s.as_u16()),
            timed_out: err.is_timeout(),
            message: err.to_string(),
            ..Default::default()
        }
    }
}
