use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Coarse classification of every failure the relay can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingPrompt,
    MissingCredential,
    MalformedCredential,
    PromptTooLong,
    MalformedBody,
    LocalRateLimitExceeded,
    ProviderRateLimited,
    ProviderBillingIssue,
    ProviderAuthFailed,
    ProviderTimeout,
    ProviderUnknown,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("Prompt is required")]
    MissingPrompt,

    #[error("API key is required")]
    MissingCredential,

    #[error("Invalid OpenAI API key format")]
    MalformedCredential,

    #[error("Prompt too long. Maximum {max} characters.")]
    PromptTooLong { max: usize },

    #[error("Invalid request body")]
    MalformedBody,

    #[error("Rate limit exceeded. Maximum {limit} requests per {window} per API key.")]
    RateLimitExceeded { limit: u32, window: String },

    #[error("OpenAI rate limit exceeded. Please try again later.")]
    ProviderRateLimited,

    #[error("OpenAI billing issue. Please check your account.")]
    ProviderBillingIssue,

    #[error("Invalid provider credential")]
    ProviderAuthFailed,

    #[error("Image provider did not respond within {0}")]
    ProviderTimeout(String),

    #[error("Internal server error: {0}")]
    ProviderUnknown(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::MissingPrompt => ErrorKind::MissingPrompt,
            RelayError::MissingCredential => ErrorKind::MissingCredential,
            RelayError::MalformedCredential => ErrorKind::MalformedCredential,
            RelayError::PromptTooLong { .. } => ErrorKind::PromptTooLong,
            RelayError::MalformedBody => ErrorKind::MalformedBody,
            RelayError::RateLimitExceeded { .. } => ErrorKind::LocalRateLimitExceeded,
            RelayError::ProviderRateLimited => ErrorKind::ProviderRateLimited,
            RelayError::ProviderBillingIssue => ErrorKind::ProviderBillingIssue,
            RelayError::ProviderAuthFailed => ErrorKind::ProviderAuthFailed,
            RelayError::ProviderTimeout(_) => ErrorKind::ProviderTimeout,
            RelayError::ProviderUnknown(_) => ErrorKind::ProviderUnknown,
            RelayError::Configuration(_) => ErrorKind::Configuration,
            RelayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::MissingPrompt
            | ErrorKind::MissingCredential
            | ErrorKind::MalformedCredential
            | ErrorKind::PromptTooLong
            | ErrorKind::MalformedBody
            | ErrorKind::ProviderBillingIssue => StatusCode::BAD_REQUEST,
            ErrorKind::ProviderAuthFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::LocalRateLimitExceeded | ErrorKind::ProviderRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ErrorKind::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ProviderUnknown | ErrorKind::Configuration | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl From<&RelayError> for ErrorResponse {
    fn from(err: &RelayError) -> Self {
        Self::new(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = ?self.kind(), status = %status, "Request failed: {}", self);
        } else {
            tracing::warn!(kind = ?self.kind(), status = %status, "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
