use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::gateway::GenerationGateway;
use crate::rate_limiter::RateLimitAlgorithm;
use crate::response::{GenerateImageResponse, HealthResponse};
use crate::validation::{RawGenerationInput, RequestValidator};

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Application state containing the validator, rate limiter and gateway
pub struct AppState {
    pub validator: RequestValidator,
    pub rate_limiter: Arc<dyn RateLimitAlgorithm>,
    pub gateway: GenerationGateway,
}

impl AppState {
    pub fn new(
        validator: RequestValidator,
        rate_limiter: Arc<dyn RateLimitAlgorithm>,
        gateway: GenerationGateway,
    ) -> SharedState {
        Arc::new(Self {
            validator,
            rate_limiter,
            gateway,
        })
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Validate, rate limit and forward an image generation request
pub async fn generate_image(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<RawGenerationInput>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>> {
    let Json(raw) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Rejected malformed request body");
        RelayError::MalformedBody
    })?;

    let request = state.validator.validate(&raw)?;

    if !state.rate_limiter.admit(request.credential())? {
        warn!(
            credential = %request.credential().redacted(),
            "Local rate limit exceeded"
        );
        return Err(state.rate_limiter.policy().exceeded_error());
    }

    info!(
        credential = %request.credential().redacted(),
        prompt = %preview(request.prompt()),
        "Generating image"
    );

    let image = state.gateway.generate(&request).await?;
    info!(credential = %request.credential().redacted(), "Image generated successfully");

    Ok(Json(image.into()))
}

fn preview(prompt: &str) -> String {
    const PREVIEW_CHARS: usize = 100;
    if prompt.chars().count() <= PREVIEW_CHARS {
        return prompt.to_string();
    }
    let head: String = prompt.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_prompts() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(150);
        let shown = preview(&long);
        assert_eq!(shown.len(), 103);
        assert!(shown.ends_with("..."));
    }
}
