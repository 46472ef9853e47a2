pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod validation;

pub use config::Config;
pub use error::{RelayError, Result};
pub use response::GenerateImageResponse;
pub use server::create_app;
