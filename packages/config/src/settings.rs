// ABOUTME: Typed settings for OAuth credentials, token storage, and refresh policy
// ABOUTME: Loaded from environment variables with validation and defaults

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::constants::*;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid number for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid URL for {name}: {reason}")]
    InvalidUrl { name: &'static str, reason: String },
}

/// Settings for the OAuth token lifecycle.
#[derive(Clone)]
pub struct Settings {
    pub app_key: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Statically issued access token used when no refresh token is stored.
    pub static_access_token: Option<String>,
    pub static_token_lifetime: Duration,
    pub encryption_key: Option<String>,
    pub token_store_path: PathBuf,
    pub refresh_threshold: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let app_key = require(DROPBOX_APP_KEY)?;
        let app_secret = require(DROPBOX_APP_SECRET)?;
        let redirect_uri = require(DROPBOX_REDIRECT_URI)?;
        validate_url(DROPBOX_REDIRECT_URI, &redirect_uri)?;

        let authorize_url =
            get(DROPBOX_AUTHORIZE_URL).unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string());
        validate_url(DROPBOX_AUTHORIZE_URL, &authorize_url)?;

        let token_url = get(DROPBOX_TOKEN_URL).unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        validate_url(DROPBOX_TOKEN_URL, &token_url)?;

        let refresh_threshold_minutes = parse_or(
            TOKEN_REFRESH_THRESHOLD_MINUTES,
            get(TOKEN_REFRESH_THRESHOLD_MINUTES),
            DEFAULT_REFRESH_THRESHOLD_MINUTES,
        )?;
        let max_retries = parse_or(TOKEN_MAX_RETRIES, get(TOKEN_MAX_RETRIES), DEFAULT_MAX_RETRIES)?;
        let retry_delay_ms =
            parse_or(TOKEN_RETRY_DELAY_MS, get(TOKEN_RETRY_DELAY_MS), DEFAULT_RETRY_DELAY_MS)?;
        let http_timeout_secs = parse_or(
            OAUTH_HTTP_TIMEOUT_SECS,
            get(OAUTH_HTTP_TIMEOUT_SECS),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        let static_lifetime_minutes = parse_or(
            STATIC_TOKEN_LIFETIME_MINUTES,
            get(STATIC_TOKEN_LIFETIME_MINUTES),
            DEFAULT_STATIC_TOKEN_LIFETIME_MINUTES,
        )?;

        let static_token_lifetime =
            minutes_to_duration(STATIC_TOKEN_LIFETIME_MINUTES, static_lifetime_minutes)?;
        let refresh_threshold =
            minutes_to_duration(TOKEN_REFRESH_THRESHOLD_MINUTES, refresh_threshold_minutes)?;

        let token_store_path = get(TOKEN_STORE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_STORE_PATH));

        let settings = Settings {
            app_key,
            app_secret,
            redirect_uri,
            authorize_url,
            token_url,
            static_access_token: get(DROPBOX_ACCESS_TOKEN),
            static_token_lifetime,
            encryption_key: get(TOKEN_ENCRYPTION_KEY),
            token_store_path,
            refresh_threshold,
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
        };

        debug!(
            store = %settings.token_store_path.display(),
            max_retries = settings.max_retries,
            retry_delay_ms = retry_delay_ms,
            "Loaded token settings"
        );

        Ok(settings)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field(
                "static_access_token",
                &self.static_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("static_token_lifetime", &self.static_token_lifetime)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("token_store_path", &self.token_store_path)
            .field("refresh_threshold", &self.refresh_threshold)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> ConfigResult<T> {
    match value {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}

fn minutes_to_duration(name: &'static str, minutes: u64) -> ConfigResult<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidNumber {
            name,
            value: minutes.to_string(),
        })
}

fn validate_url(name: &'static str, value: &str) -> ConfigResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            name,
            reason: e.to_string(),
        })
}
