// ABOUTME: Classification of provider token-endpoint failures
// ABOUTME: Maps status code, error body, and transport failures to tagged refresh errors

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RefreshError, RefreshErrorKind};

/// A failed call to the provider token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// No response was received (connect error, timeout, broken body stream)
    NoResponse(String),
    /// The provider answered with a non-success status
    Http { status: u16, body: String },
    /// Success status but the body was not a usable token response
    Malformed(String),
}

impl ProviderFailure {
    /// Human-readable summary, preferring the provider's own description
    pub fn describe(&self) -> String {
        match self {
            ProviderFailure::NoResponse(reason) => format!("no response from provider: {}", reason),
            ProviderFailure::Http { status, body } => match ProviderErrorBody::parse(body) {
                Some(err) => match err.description() {
                    Some(desc) => format!("HTTP {}: {}", status, desc),
                    None => format!("HTTP {}", status),
                },
                None => format!("HTTP {}", status),
            },
            ProviderFailure::Malformed(reason) => format!("invalid token response: {}", reason),
        }
    }
}

/// Error body returned by the provider token endpoint.
///
/// `error` is a string for standard OAuth errors and a tagged object for
/// some provider-specific failures.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_summary: Option<String>,
}

impl ProviderErrorBody {
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    fn code(&self) -> Option<&str> {
        match self.error.as_ref()? {
            Value::String(code) => Some(code.as_str()),
            Value::Object(map) => map.get(".tag").and_then(Value::as_str),
            _ => None,
        }
    }

    fn description(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.error_summary.clone())
            .or_else(|| self.code().map(str::to_string))
    }
}

/// Classify a failed refresh call.
///
/// | input                              | kind           | retryable |
/// |------------------------------------|----------------|-----------|
/// | 401 with `invalid_grant`           | INVALID_GRANT  | no        |
/// | 429                                | RATE_LIMIT     | yes       |
/// | >= 500                             | SERVER_ERROR   | yes       |
/// | no response                        | NETWORK_ERROR  | yes       |
/// | anything else                      | UNKNOWN_ERROR  | yes       |
pub fn classify_refresh_failure(failure: &ProviderFailure) -> RefreshError {
    let kind = match failure {
        ProviderFailure::NoResponse(_) => RefreshErrorKind::NetworkError,
        ProviderFailure::Http { status: 401, body }
            if ProviderErrorBody::parse(body)
                .as_ref()
                .and_then(ProviderErrorBody::code)
                == Some("invalid_grant") =>
        {
            RefreshErrorKind::InvalidGrant
        }
        ProviderFailure::Http { status: 429, .. } => RefreshErrorKind::RateLimit,
        ProviderFailure::Http { status, .. } if *status >= 500 => RefreshErrorKind::ServerError,
        ProviderFailure::Http { .. } | ProviderFailure::Malformed(_) => {
            RefreshErrorKind::UnknownError
        }
    };

    RefreshError::new(kind, failure.describe())
}
