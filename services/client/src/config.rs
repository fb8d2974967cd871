//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Origin the auth emails redirect back to.
    pub site_url: String,
    pub log_level: Level,
    pub stale_after: Duration,
    pub http_timeout: Duration,
    pub digest_bucket: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Supabase Settings ---
        let supabase_url = lookup("SUPABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("SUPABASE_URL".to_string()))?;
        let supabase_url = url::Url::parse(&supabase_url)
            .map_err(|e| ConfigError::InvalidValue("SUPABASE_URL".to_string(), e.to_string()))?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        let supabase_anon_key = lookup("SUPABASE_ANON_KEY")
            .ok_or_else(|| ConfigError::MissingVar("SUPABASE_ANON_KEY".to_string()))?;

        let site_url = lookup("SITE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Load Logging ---
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Cache & Transport Settings ---
        let stale_after = Duration::from_secs(parse_secs(&lookup, "QUERY_STALE_AFTER_SECS", 600)?);
        let http_timeout = Duration::from_secs(parse_secs(&lookup, "HTTP_TIMEOUT_SECS", 15)?);
        let digest_bucket =
            lookup("DIGEST_BUCKET").unwrap_or_else(|| "weekly-digests".to_string());

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            site_url,
            log_level,
            stale_after,
            http_timeout,
            digest_bucket,
        })
    }

    /// Where new accounts land after confirming their email.
    pub fn sign_up_redirect(&self) -> String {
        format!("{}/", self.site_url)
    }

    /// Where recovery links land.
    pub fn password_reset_redirect(&self) -> String {
        format!("{}{}", self.site_url, daily_gk_core::RESET_PASSWORD_ROUTE)
    }
}

fn parse_secs<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
