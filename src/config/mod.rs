//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Credentials are wrapped in `secrecy::SecretString`.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::queue::{Backoff, QueueConfig};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,

    pub queue: QueueConfig,

    /// Base URL of the file proxy used for folder listings and media URLs.
    pub file_proxy_url: Option<String>,

    /// Mail API endpoint. Unset means invites are only logged.
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<SecretString>,
    pub mail_from: String,

    /// Anthropic key for listing descriptions. Unset means template text.
    pub anthropic_api_key: Option<SecretString>,
    pub llm_model: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let backoff = Backoff {
            base: Duration::from_millis(parsed_var("JOB_BACKOFF_BASE_MS", 1_000)?),
            max: Duration::from_secs(parsed_var("JOB_BACKOFF_MAX_SECS", 300)?),
        };
        let queue = QueueConfig {
            poll_interval: Duration::from_secs(nonzero_var("JOB_POLL_INTERVAL_SECS", 5)?),
            max_retries: parsed_var("JOB_MAX_RETRIES", 3)?,
            backoff,
            kick_on_enqueue: true,
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            queue,
            file_proxy_url: optional_var("FILE_PROXY_URL"),
            mail_api_url: optional_var("MAIL_API_URL"),
            mail_api_key: optional_var("MAIL_API_KEY").map(SecretString::from),
            mail_from: optional_var("MAIL_FROM")
                .unwrap_or_else(|| "no-reply@localhost".to_string()),
            anthropic_api_key: optional_var("ANTHROPIC_API_KEY").map(SecretString::from),
            llm_model: optional_var("LLM_MODEL")
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Set and non-empty.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

/// Like [`parsed_var`], but zero is rejected.
fn nonzero_var(name: &str, default: u64) -> Result<u64> {
    match parsed_var(name, default)? {
        0 => Err(Error::Config(format!("{name} must be greater than zero"))),
        n => Ok(n),
    }
}
