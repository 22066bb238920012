// ABOUTME: HTTP client for the storage provider's OAuth endpoints
// ABOUTME: Builds PKCE authorization URLs and posts form-encoded token grants

use chrono::Utc;
use reqwest::Client;
use tokenvault_config::Settings;
use tracing::debug;
use url::Url;

use crate::{
    error::{AuthError, AuthResult},
    oauth::{
        classify::ProviderFailure,
        types::{PkceChallenge, TokenResponse},
    },
};

/// Client for the provider authorization and token endpoints
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    app_key: String,
    app_secret: String,
    redirect_uri: String,
    authorize_url: String,
    token_url: String,
}

impl ProviderClient {
    pub fn new(settings: &Settings) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            app_key: settings.app_key.clone(),
            app_secret: settings.app_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.token_url.clone(),
        })
    }

    /// Build authorization URL with PKCE challenge and state parameter.
    ///
    /// Requests offline access so the provider issues a refresh token.
    pub fn authorization_url(&self, pkce: &PkceChallenge, state: &str) -> AuthResult<String> {
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid authorize URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", self.app_key.as_str())
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", &pkce.code_challenge_method)
            .append_pair("token_access_type", "offline")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange authorization code for access token
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ProviderFailure> {
        self.post_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.app_key.as_str()),
            ("client_secret", self.app_secret.as_str()),
        ])
        .await
    }

    /// Exchange refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ProviderFailure> {
        self.post_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.app_key.as_str()),
            ("client_secret", self.app_secret.as_str()),
        ])
        .await
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ProviderFailure> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderFailure::NoResponse(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Token endpoint responded");

        // Body read failures mean the response never fully arrived
        let body = response
            .text()
            .await
            .map_err(|e| ProviderFailure::NoResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderFailure::Http {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ProviderFailure::Malformed(e.to_string()))?;

        // Lifetime must be positive and representable as an absolute expiry
        let now_ms = Utc::now().timestamp_millis();
        if token
            .lifetime_millis()
            .and_then(|ms| now_ms.checked_add(ms))
            .is_none()
        {
            return Err(ProviderFailure::Malformed(format!(
                "expires_in {} is not a usable token lifetime",
                token.expires_in
            )));
        }

        Ok(token)
    }
}
