use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::window::DEFAULT_WINDOW_CAPACITY;

/// Application configuration loaded from environment variables.
/// Built once in `main` and handed to the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Turns retained per session window.
    pub window_capacity: usize,
    pub completion_timeout: Duration,
    pub llm_max_retries: u32,
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_or("PORT", std::env::var("PORT").ok(), 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            window_capacity: parse_or(
                "WINDOW_CAPACITY",
                std::env::var("WINDOW_CAPACITY").ok(),
                DEFAULT_WINDOW_CAPACITY,
            )?,
            completion_timeout: Duration::from_secs(parse_or(
                "COMPLETION_TIMEOUT_SECS",
                std::env::var("COMPLETION_TIMEOUT_SECS").ok(),
                60,
            )?),
            llm_max_retries: parse_or(
                "LLM_MAX_RETRIES",
                std::env::var("LLM_MAX_RETRIES").ok(),
                3,
            )?,
            session_idle_ttl: Duration::from_secs(parse_or(
                "SESSION_IDLE_TTL_SECS",
                std::env::var("SESSION_IDLE_TTL_SECS").ok(),
                3600,
            )?),
            session_sweep_interval: Duration::from_secs(parse_or(
                "SESSION_SWEEP_INTERVAL_SECS",
                std::env::var("SESSION_SWEEP_INTERVAL_SECS").ok(),
                300,
            )?),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses an optional raw value, falling back to `default` when it is absent or blank.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{value}'")),
        _ => Ok(default),
    }
}
