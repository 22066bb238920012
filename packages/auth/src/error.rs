// ABOUTME: Error types for token exchange, refresh, and persistence
// ABOUTME: Refresh failures carry a tagged kind that decides whether a retry is worthwhile

use std::fmt;

use thiserror::Error;
use tokenvault_config::ConfigError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No token available; complete the authorization flow first")]
    NotAuthenticated,

    #[error("No refresh token available; re-authentication required")]
    NoRefreshToken,

    #[error("Token persistence failed: {0}")]
    Persistence(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Token refresh failed after {attempts} attempt(s): {reason}")]
    RefreshFailed { attempts: u32, reason: String },

    #[error("PKCE error: {0}")]
    Pkce(String),
}

impl AuthError {
    /// Whether the failed operation may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Refresh(e) if e.is_retryable())
    }

    /// Kind of the underlying refresh failure, if any
    pub fn refresh_kind(&self) -> Option<RefreshErrorKind> {
        match self {
            AuthError::Refresh(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

/// Classification of a failed refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshErrorKind {
    /// Refresh token revoked or expired
    InvalidGrant,
    RateLimit,
    ServerError,
    /// No response received (connect failure, timeout)
    NetworkError,
    UnknownError,
    MaxRetriesExceeded,
}

impl RefreshErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidGrant | Self::MaxRetriesExceeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidGrant => "INVALID_GRANT",
            Self::RateLimit => "RATE_LIMIT",
            Self::ServerError => "SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
        }
    }
}

impl fmt::Display for RefreshErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed refresh attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RefreshError {
    pub kind: RefreshErrorKind,
    pub message: String,
}

impl RefreshError {
    pub fn new(kind: RefreshErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if !kind.is_retryable() {
            message.push_str("; re-authentication required");
        }
        Self { kind, message }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
