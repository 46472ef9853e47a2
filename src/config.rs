use clap::Parser;
use humantime_serde::re::humantime;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::credential::CredentialFormat;
use crate::error::{RelayError, Result};
use crate::gateway::openai::DEFAULT_BASE_URL;
use crate::gateway::{ClassificationTable, ImageParams};
use crate::rate_limiter::RateLimitPolicy;

const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "imagegen-relay", version, about = "Image generation relay")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// Origins allowed by CORS, comma separated
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://127.0.0.1:3000,http://localhost:8000,http://127.0.0.1:8000"
    )]
    #[validate(length(min = 1))]
    pub allowed_origins: Vec<String>,

    /// Requests allowed per credential per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 10)]
    #[validate(range(min = 1))]
    pub rate_limit: u32,

    /// Rate limit window, e.g. `1h` or `15m`
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "1h", value_parser = humantime::parse_duration)]
    #[validate(custom(function = "validate_window"))]
    pub rate_limit_window: Duration,

    /// How often expired rate windows are swept
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    #[validate(custom(function = "validate_nonzero_duration"))]
    pub cleanup_interval: Duration,

    /// Maximum prompt length in characters, after trimming
    #[arg(long, env = "MAX_PROMPT_CHARS", default_value_t = 1000)]
    #[validate(range(min = 1))]
    pub max_prompt_chars: usize,

    /// Prefix every credential must start with
    #[arg(long, env = "CREDENTIAL_PREFIX", default_value = "sk-")]
    pub credential_prefix: String,

    /// Minimum credential length
    #[arg(long, env = "CREDENTIAL_MIN_LEN", default_value_t = 20)]
    #[validate(range(min = 1))]
    pub credential_min_len: usize,

    /// Image provider API base URL
    #[arg(long, env = "PROVIDER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    #[validate(url)]
    pub provider_base_url: String,

    /// Image model requested from the provider
    #[arg(long, env = "IMAGE_MODEL", default_value = "dall-e-3")]
    #[validate(length(min = 1))]
    pub image_model: String,

    /// Upper bound on a single provider call
    #[arg(long, env = "PROVIDER_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    #[validate(custom(function = "validate_nonzero_duration"))]
    pub provider_timeout: Duration,

    /// JSON file overriding the provider error classification table
    #[arg(long, env = "ERROR_RULES")]
    pub error_rules: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from command line arguments and environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::parse();
        config.check()?;
        Ok(config)
    }

    /// Parse from an explicit argument list; environment variables still apply.
    pub fn try_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)
            .map_err(|e| RelayError::Configuration(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| RelayError::Configuration(e.to_string()))
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            limit: self.rate_limit,
            window: self.rate_limit_window,
        }
    }

    pub fn credential_format(&self) -> CredentialFormat {
        CredentialFormat::new(self.credential_prefix.clone(), self.credential_min_len)
    }

    pub fn image_params(&self) -> ImageParams {
        ImageParams {
            model: self.image_model.clone(),
            ..ImageParams::default()
        }
    }

    pub fn classification_table(&self) -> Result<ClassificationTable> {
        match &self.error_rules {
            Some(path) => ClassificationTable::from_json_file(path),
            None => Ok(ClassificationTable::default()),
        }
    }
}

fn validate_window(window: &Duration) -> std::result::Result<(), ValidationError> {
    if window.is_zero() || *window > MAX_WINDOW {
        return Err(ValidationError::new("window_out_of_range"));
    }
    Ok(())
}

fn validate_nonzero_duration(duration: &Duration) -> std::result::Result<(), ValidationError> {
    if duration.is_zero() {
        return Err(ValidationError::new("zero_duration"));
    }
    Ok(())
}
