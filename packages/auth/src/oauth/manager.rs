// ABOUTME: Token lifecycle manager orchestrating authorization, exchange, and refresh
// ABOUTME: Owns the single token state behind a mutex and enforces the refresh retry policy

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokenvault_config::Settings;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    error::{AuthError, AuthResult, RefreshError, RefreshErrorKind},
    oauth::{
        classify::classify_refresh_failure,
        pkce::generate_pkce_challenge,
        provider::ProviderClient,
        storage::TokenStore,
        types::{AuthorizationRequest, TokenState, TokenStatus},
    },
};

/// Manager for the OAuth token lifecycle
///
/// All operations that may touch the provider hold the state lock for their
/// whole duration, so concurrent callers never trigger duplicate refreshes.
pub struct TokenManager {
    provider: ProviderClient,
    store: Arc<dyn TokenStore>,
    state: Mutex<Option<TokenState>>,
    refresh_threshold: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl TokenManager {
    /// Create a manager with no token state
    pub fn new(settings: &Settings, store: Arc<dyn TokenStore>) -> AuthResult<Self> {
        Ok(Self {
            provider: ProviderClient::new(settings)?,
            store,
            state: Mutex::new(None),
            refresh_threshold: settings.refresh_threshold,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        })
    }

    /// Create a manager and load persisted token state.
    ///
    /// Falls back to the statically configured access token when nothing is
    /// persisted. A store that exists but cannot be read is a hard error.
    pub async fn load(settings: &Settings, store: Arc<dyn TokenStore>) -> AuthResult<Self> {
        let manager = Self::new(settings, store)?;

        let loaded = match manager.store.load().await? {
            Some(state) => {
                info!(
                    expires_at = state.expires_at,
                    refresh_attempts = state.refresh_attempts,
                    "Loaded persisted token state"
                );
                Some(state)
            }
            None => settings.static_access_token.as_deref().map(|token| {
                // Heuristic lifetime; the provider never confirms it
                warn!(
                    lifetime_secs = settings.static_token_lifetime.as_secs(),
                    "Using static access token with an assumed, unverified lifetime"
                );
                TokenState::from_static(token, settings.static_token_lifetime, now_millis())
            }),
        };

        *manager.state.lock().await = loaded;
        Ok(manager)
    }

    /// Build an authorization URL with a fresh PKCE challenge.
    ///
    /// The caller must keep the returned verifier to complete the exchange.
    pub fn generate_authorization_request(&self) -> AuthResult<AuthorizationRequest> {
        let pkce = generate_pkce_challenge()?;
        debug!("Generated PKCE challenge");

        // State parameter for CSRF protection, checked by the callback handler
        let state = nanoid::nanoid!();
        let url = self.provider.authorization_url(&pkce, &state)?;

        Ok(AuthorizationRequest {
            url,
            code_verifier: pkce.code_verifier,
            state,
        })
    }

    /// Exchange an authorization code for tokens and persist them
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenState> {
        let mut slot = self.state.lock().await;
        info!("Exchanging authorization code for tokens");

        let response = self
            .provider
            .exchange_code(code, code_verifier)
            .await
            .map_err(|failure| {
                error!("Token exchange failed: {}", failure.describe());
                AuthError::Exchange(failure.describe())
            })?;

        let state = TokenState::from_exchange(response, code_verifier, now_millis());
        *slot = Some(state.clone());
        self.store.save(&state).await?;

        info!(expires_at = state.expires_at, "✅ Authorization code exchanged");
        Ok(state)
    }

    /// Refresh the access token once, subject to cooldown and attempt limits
    pub async fn refresh(&self) -> AuthResult<TokenState> {
        let mut slot = self.state.lock().await;
        self.refresh_locked(&mut slot).await
    }

    /// Return an access token that is not within the refresh threshold of expiry,
    /// refreshing with bounded retries when needed.
    pub async fn get_valid_access_token(&self) -> AuthResult<String> {
        let mut slot = self.state.lock().await;

        let state = slot.as_ref().ok_or(AuthError::NotAuthenticated)?;
        if !state.needs_refresh(now_millis(), self.refresh_threshold) {
            return Ok(state.access_token.clone());
        }

        debug!("Access token is stale, refreshing");
        let mut last_error: Option<RefreshError> = None;

        for attempt in 1..=self.max_retries {
            match self.refresh_locked(&mut slot).await {
                Ok(state) => return Ok(state.access_token),
                Err(AuthError::Refresh(e)) if e.is_retryable() => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        kind = %e.kind,
                        "Token refresh failed, will retry: {}",
                        e.message
                    );
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => {
                    error!("Token refresh failed permanently: {}", e);
                    return Err(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no refresh attempts permitted".to_string());
        error!(attempts = self.max_retries, "Token refresh exhausted retries");
        Err(AuthError::RefreshFailed {
            attempts: self.max_retries,
            reason,
        })
    }

    /// Snapshot of the current token state
    pub async fn current_state(&self) -> Option<TokenState> {
        self.state.lock().await.clone()
    }

    /// Redacted status summary for display
    pub async fn status(&self) -> TokenStatus {
        match self.state.lock().await.as_ref() {
            Some(state) => TokenStatus::from_state(state, now_millis()),
            None => TokenStatus::unauthenticated(),
        }
    }

    async fn refresh_locked(&self, slot: &mut Option<TokenState>) -> AuthResult<TokenState> {
        let state = slot.as_mut().ok_or(AuthError::NotAuthenticated)?;
        if !state.has_refresh_token() {
            return Err(AuthError::NoRefreshToken);
        }

        let now = now_millis();
        let retry_delay_ms = i64::try_from(self.retry_delay.as_millis()).unwrap_or(i64::MAX);

        // Cooldown and attempt limits are checked before any network call
        if let Some(last) = state.last_refresh_attempt {
            let elapsed = now - last;
            if elapsed < retry_delay_ms {
                return Err(RefreshError::new(
                    RefreshErrorKind::RateLimit,
                    format!(
                        "last refresh attempt was {}ms ago, cooling down for {}ms",
                        elapsed, retry_delay_ms
                    ),
                )
                .into());
            }
        }

        state.refresh_attempts += 1;
        state.last_refresh_attempt = Some(now);

        if state.refresh_attempts > self.max_retries {
            return Err(RefreshError::new(
                RefreshErrorKind::MaxRetriesExceeded,
                format!(
                    "{} consecutive refresh attempts exceed the limit of {}",
                    state.refresh_attempts, self.max_retries
                ),
            )
            .into());
        }

        info!(attempt = state.refresh_attempts, "Refreshing access token");

        match self.provider.refresh(&state.refresh_token).await {
            Ok(response) => {
                let refreshed = state.refreshed(response, now_millis());
                *state = refreshed.clone();
                self.store.save(&refreshed).await?;

                info!(expires_at = refreshed.expires_at, "✅ Access token refreshed");
                Ok(refreshed)
            }
            Err(failure) => {
                let err = classify_refresh_failure(&failure);
                debug!(kind = %err.kind, retryable = err.is_retryable(), "Classified refresh failure");
                Err(err.into())
            }
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
