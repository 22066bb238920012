// ABOUTME: Core type definitions for the OAuth token lifecycle
// ABOUTME: Includes the persisted token state, provider responses, and PKCE challenge types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Token state owned by the manager and persisted encrypted on disk
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    /// Empty when running on a statically configured access token
    #[serde(default)]
    pub refresh_token: String,
    /// Milliseconds since the Unix epoch
    pub expires_at: i64,
    #[serde(default)]
    pub scope: BTreeSet<String>,
    #[serde(default)]
    pub last_refresh_attempt: Option<i64>,
    #[serde(default)]
    pub refresh_attempts: u32,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl TokenState {
    /// Build state from a successful authorization-code exchange
    pub fn from_exchange(response: TokenResponse, code_verifier: &str, now_ms: i64) -> Self {
        Self {
            expires_at: response.expires_at(now_ms),
            scope: response.scope_set().unwrap_or_default(),
            access_token: response.access_token,
            refresh_token: response.refresh_token.unwrap_or_default(),
            last_refresh_attempt: None,
            refresh_attempts: 0,
            code_verifier: Some(code_verifier.to_string()),
            account_id: response.account_id,
        }
    }

    /// Build state for a statically configured access token.
    ///
    /// The provider never confirms this lifetime.
    pub fn from_static(access_token: &str, lifetime: Duration, now_ms: i64) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: String::new(),
            expires_at: now_ms.saturating_add(duration_millis(lifetime)),
            scope: BTreeSet::new(),
            last_refresh_attempt: None,
            refresh_attempts: 0,
            code_verifier: None,
            account_id: None,
        }
    }

    /// State after a successful refresh, with attempt counters reset
    pub fn refreshed(&self, response: TokenResponse, now_ms: i64) -> Self {
        Self {
            expires_at: response.expires_at(now_ms),
            scope: response.scope_set().unwrap_or_else(|| self.scope.clone()),
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
            last_refresh_attempt: None,
            refresh_attempts: 0,
            code_verifier: self.code_verifier.clone(),
            account_id: response.account_id.or_else(|| self.account_id.clone()),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Check if token is within the refresh threshold of expiry
    pub fn needs_refresh(&self, now_ms: i64, threshold: Duration) -> bool {
        now_ms >= self.expires_at.saturating_sub(duration_millis(threshold))
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Milliseconds until expiry (negative once expired)
    pub fn expires_in(&self, now_ms: i64) -> i64 {
        self.expires_at - now_ms
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &if self.has_refresh_token() {
                    "<redacted>"
                } else {
                    "<none>"
                },
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("last_refresh_attempt", &self.last_refresh_attempt)
            .field("refresh_attempts", &self.refresh_attempts)
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Redacted summary of the current token state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub authenticated: bool,
    pub expires_at: Option<i64>,
    pub has_refresh_token: bool,
    pub refresh_attempts: u32,
    pub last_refresh_attempt: Option<i64>,
    pub scope: Vec<String>,
    pub account_id: Option<String>,
}

impl TokenStatus {
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            expires_at: None,
            has_refresh_token: false,
            refresh_attempts: 0,
            last_refresh_attempt: None,
            scope: Vec::new(),
            account_id: None,
        }
    }

    pub fn from_state(state: &TokenState, now_ms: i64) -> Self {
        Self {
            authenticated: !state.is_expired(now_ms),
            expires_at: Some(state.expires_at),
            has_refresh_token: state.has_refresh_token(),
            refresh_attempts: state.refresh_attempts,
            last_refresh_attempt: state.last_refresh_attempt,
            scope: state.scope.iter().cloned().collect(),
            account_id: state.account_id.clone(),
        }
    }
}

/// PKCE challenge for OAuth flow
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String, // Always "S256"
}

/// Authorization URL plus the values the caller must retain to finish the flow
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub code_verifier: String,
    /// CSRF state echoed back to the redirect URI
    pub state: String,
}

/// OAuth token response from provider
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64, // Seconds
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub account_id: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(self.expires_in.saturating_mul(1000))
    }

    /// Reported lifetime in milliseconds; `None` unless positive and in range
    pub fn lifetime_millis(&self) -> Option<i64> {
        if self.expires_in <= 0 {
            return None;
        }
        self.expires_in.checked_mul(1000)
    }

    fn scope_set(&self) -> Option<BTreeSet<String>> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("account_id", &self.account_id)
            .finish()
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
