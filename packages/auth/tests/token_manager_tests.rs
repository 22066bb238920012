// ABOUTME: Integration tests for the token lifecycle manager
// ABOUTME: Drives exchange, refresh, cooldown, and retry behavior against a mock token endpoint

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rstest::rstest;
use serde_json::json;
use url::Url;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use tokenvault_auth::{
    oauth::pkce::verify_pkce_challenge, AuthError, AuthResult, MemoryTokenStore,
    RefreshErrorKind, TokenManager, TokenState, TokenStore,
};
use tokenvault_config::Settings;

const TOKEN_PATH: &str = "/oauth2/token";
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Helper to build settings pointing at the mock token endpoint
fn test_settings(server: &MockServer) -> Settings {
    let vars = HashMap::from([
        ("DROPBOX_APP_KEY", "test-app-key".to_string()),
        ("DROPBOX_APP_SECRET", "test-app-secret".to_string()),
        (
            "DROPBOX_REDIRECT_URI",
            "http://localhost:3000/oauth/callback".to_string(),
        ),
        ("DROPBOX_TOKEN_URL", format!("{}{}", server.uri(), TOKEN_PATH)),
    ]);
    let mut settings = Settings::from_lookup(|name| vars.get(name).cloned()).unwrap();
    settings.max_retries = 3;
    settings.retry_delay = RETRY_DELAY;
    settings.http_timeout = Duration::from_secs(2);
    settings
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Helper to create a token state expiring `expires_in_seconds` from now
fn create_test_state(expires_in_seconds: i64) -> TokenState {
    TokenState {
        access_token: "sl.current-access".to_string(),
        refresh_token: "test-refresh-token".to_string(),
        expires_at: now_ms() + expires_in_seconds * 1000,
        scope: BTreeSet::from(["files.content.read".to_string()]),
        last_refresh_attempt: None,
        refresh_attempts: 0,
        code_verifier: None,
        account_id: None,
    }
}

/// Helper to create a manager over an in-memory store seeded with `state`
async fn setup_manager(
    server: &MockServer,
    state: Option<TokenState>,
) -> (TokenManager, Arc<MemoryTokenStore>) {
    let store = Arc::new(match state {
        Some(state) => MemoryTokenStore::with_state(state),
        None => MemoryTokenStore::new(),
    });
    let manager = TokenManager::load(&test_settings(server), store.clone())
        .await
        .unwrap();
    (manager, store)
}

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "expires_in": 14400,
        "token_type": "bearer",
        "scope": "files.content.read files.content.write",
        "account_id": "dbid:test"
    })
}

fn assert_refresh_kind(err: &AuthError, kind: RefreshErrorKind) {
    assert_eq!(err.refresh_kind(), Some(kind), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_fresh_token_returned_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.unused")))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, _store) = setup_manager(&server, Some(create_test_state(3600))).await;

    let token = manager.get_valid_access_token().await.unwrap();
    assert_eq!(token, "sl.current-access");
}

#[tokio::test]
async fn test_no_state_is_not_authenticated() {
    let server = MockServer::start().await;
    let (manager, _store) = setup_manager(&server, None).await;

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
    assert!(!manager.status().await.authenticated);
}

#[tokio::test]
async fn test_refresh_within_cooldown_is_rate_limited_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.unused")))
        .expect(0)
        .mount(&server)
        .await;

    let mut state = create_test_state(-60);
    state.last_refresh_attempt = Some(now_ms());
    state.refresh_attempts = 1;
    let (manager, _store) = setup_manager(&server, Some(state)).await;

    let err = manager.refresh().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::RateLimit);
    assert!(err.is_retryable());

    // Counters untouched by a rejected attempt
    assert_eq!(manager.current_state().await.unwrap().refresh_attempts, 1);
}

#[tokio::test]
async fn test_refresh_beyond_max_attempts_is_terminal_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.unused")))
        .expect(0)
        .mount(&server)
        .await;

    let mut state = create_test_state(-60);
    state.refresh_attempts = 3;
    let (manager, _store) = setup_manager(&server, Some(state)).await;

    let err = manager.refresh().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::MaxRetriesExceeded);
    assert!(!err.is_retryable());

    // get_valid_access_token surfaces the terminal error immediately
    tokio::time::sleep(RETRY_DELAY).await;
    let err = manager.get_valid_access_token().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::MaxRetriesExceeded);
}

#[tokio::test]
async fn test_successful_refresh_resets_counters_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=test-refresh-token"))
        .and(body_string_contains("client_id=test-app-key"))
        .and(body_string_contains("client_secret=test-app-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.refreshed")))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = create_test_state(-60);
    state.refresh_attempts = 2;
    state.last_refresh_attempt = Some(now_ms() - 10_000);
    let (manager, store) = setup_manager(&server, Some(state)).await;

    let before = now_ms();
    let refreshed = manager.refresh().await.unwrap();

    assert_eq!(refreshed.access_token, "sl.refreshed");
    assert_eq!(refreshed.refresh_token, "test-refresh-token");
    assert_eq!(refreshed.refresh_attempts, 0);
    assert!(refreshed.last_refresh_attempt.is_none());
    assert!(refreshed.expires_at >= before + 14_400_000);
    assert!(refreshed.scope.contains("files.content.write"));
    assert_eq!(refreshed.account_id.as_deref(), Some("dbid:test"));

    assert_eq!(store.snapshot().await, Some(refreshed.clone()));
    assert_eq!(manager.current_state().await, Some(refreshed));
}

#[tokio::test]
async fn test_stale_token_is_refreshed_transparently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.refreshed")))
        .expect(1)
        .mount(&server)
        .await;

    // Inside the default 5-minute refresh threshold
    let (manager, _store) = setup_manager(&server, Some(create_test_state(120))).await;

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "sl.refreshed");
    // Second call is served from the refreshed state
    assert_eq!(manager.get_valid_access_token().await.unwrap(), "sl.refreshed");
}

#[tokio::test]
async fn test_invalid_grant_is_surfaced_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token is invalid or revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, Some(create_test_state(-60))).await;

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::InvalidGrant);
    assert!(!err.is_retryable());

    let message = err.to_string();
    assert!(message.contains("refresh token is invalid or revoked"));
    assert!(message.contains("re-authentication required"));
    assert!(!message.contains("test-refresh-token"));

    // Failed attempts are not persisted
    assert_eq!(store.snapshot().await.unwrap().refresh_attempts, 0);
    assert_eq!(manager.current_state().await.unwrap().refresh_attempts, 1);
}

#[tokio::test]
async fn test_server_errors_retry_exactly_max_times_with_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let (manager, _store) = setup_manager(&server, Some(create_test_state(-60))).await;

    let started = tokio::time::Instant::now();
    let err = manager.get_valid_access_token().await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        AuthError::RefreshFailed { attempts, reason } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("SERVER_ERROR"));
        }
        other => panic!("Expected RefreshFailed, got {:?}", other),
    }

    // Two sleeps between three attempts
    assert!(elapsed >= RETRY_DELAY * 2, "elapsed {:?}", elapsed);
    assert_eq!(manager.current_state().await.unwrap().refresh_attempts, 3);
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, Some(create_test_state(-60))).await;

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "sl.recovered");

    let persisted = store.snapshot().await.unwrap();
    assert_eq!(persisted.refresh_attempts, 0);
    assert!(persisted.last_refresh_attempt.is_none());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("sl.refreshed"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _store) = setup_manager(&server, Some(create_test_state(-60))).await;
    let manager = Arc::new(manager);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_valid_access_token().await }
    });
    let second = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_valid_access_token().await }
    });

    assert_eq!(first.await.unwrap().unwrap(), "sl.refreshed");
    assert_eq!(second.await.unwrap().unwrap(), "sl.refreshed");
}

#[tokio::test]
async fn test_network_failure_is_retryable() {
    let server = MockServer::start().await;
    let mut settings = test_settings(&server);
    // Nothing listens on the discard port
    settings.token_url = "http://127.0.0.1:9/oauth2/token".to_string();
    settings.max_retries = 2;

    let store = Arc::new(MemoryTokenStore::with_state(create_test_state(-60)));
    let manager = TokenManager::load(&settings, store).await.unwrap();

    let err = manager.refresh().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::NetworkError);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_timeout_is_retryable_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("sl.too-late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut settings = test_settings(&server);
    settings.http_timeout = Duration::from_millis(300);

    let store = Arc::new(MemoryTokenStore::with_state(create_test_state(-60)));
    let manager = TokenManager::load(&settings, store).await.unwrap();

    let err = manager.refresh().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::NetworkError);
    assert!(err.is_retryable());
    assert_eq!(
        manager.current_state().await.unwrap().access_token,
        "sl.current-access"
    );
}

#[rstest]
#[case::zero(json!(0))]
#[case::negative(json!(-3600))]
#[case::overflowing(json!(10_000_000_000_000_000_i64))]
#[tokio::test]
async fn test_unusable_lifetime_rejected_on_refresh(#[case] expires_in: serde_json::Value) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.bogus",
            "expires_in": expires_in,
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, Some(create_test_state(-60))).await;

    let err = manager.refresh().await.unwrap_err();
    assert_refresh_kind(&err, RefreshErrorKind::UnknownError);
    assert!(err.is_retryable());

    let state = manager.current_state().await.unwrap();
    assert_eq!(state.access_token, "sl.current-access");
    assert_eq!(store.snapshot().await.unwrap().access_token, "sl.current-access");
}

#[tokio::test]
async fn test_unusable_lifetime_rejected_on_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.bogus",
            "refresh_token": "refresh",
            "expires_in": -3600,
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, None).await;

    let err = manager.exchange_code("code", "verifier").await.unwrap_err();
    assert!(matches!(&err, AuthError::Exchange(msg) if msg.contains("expires_in")));
    assert!(store.snapshot().await.is_none());
    assert!(matches!(
        manager.get_valid_access_token().await,
        Err(AuthError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn test_exchange_code_persists_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-123"))
        .and(body_string_contains("code_verifier=the-verifier"))
        .and(body_string_contains("redirect_uri="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sl.exchanged",
            "refresh_token": "new-refresh-token",
            "expires_in": 14400,
            "token_type": "bearer",
            "scope": "account_info.read",
            "account_id": "dbid:test"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, None).await;

    let before = now_ms();
    let state = manager
        .exchange_code("auth-code-123", "the-verifier")
        .await
        .unwrap();

    assert_eq!(state.access_token, "sl.exchanged");
    assert_eq!(state.refresh_token, "new-refresh-token");
    assert_eq!(state.code_verifier.as_deref(), Some("the-verifier"));
    assert!(state.expires_at >= before + 14_400_000);
    assert_eq!(store.snapshot().await, Some(state));

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "sl.exchanged");
    let status = manager.status().await;
    assert!(status.authenticated);
    assert!(status.has_refresh_token);
}

#[tokio::test]
async fn test_exchange_failure_includes_provider_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code has expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = setup_manager(&server, None).await;

    let err = manager.exchange_code("stale-code", "verifier").await.unwrap_err();
    assert!(matches!(&err, AuthError::Exchange(msg) if msg.contains("code has expired")));
    assert!(store.snapshot().await.is_none());
}

#[tokio::test]
async fn test_authorization_request_embeds_pkce_challenge() {
    let server = MockServer::start().await;
    let (manager, _store) = setup_manager(&server, None).await;

    let request = manager.generate_authorization_request().unwrap();
    let url = Url::parse(&request.url).unwrap();
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    assert_eq!(request.code_verifier.len(), 43);
    assert!(verify_pkce_challenge(
        &request.code_verifier,
        &params["code_challenge"]
    ));
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["token_access_type"], "offline");
    assert_eq!(params["client_id"], "test-app-key");
    assert_eq!(params["state"], request.state);

    let another = manager.generate_authorization_request().unwrap();
    assert_ne!(another.code_verifier, request.code_verifier);
    assert_ne!(another.state, request.state);
}

#[tokio::test]
async fn test_static_token_used_when_store_empty() {
    let server = MockServer::start().await;
    let mut settings = test_settings(&server);
    settings.static_access_token = Some("sl.static-token".to_string());

    let store = Arc::new(MemoryTokenStore::new());
    let manager = TokenManager::load(&settings, store.clone()).await.unwrap();

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "sl.static-token");

    let state = manager.current_state().await.unwrap();
    assert!(!state.has_refresh_token());
    let lifetime_ms = state.expires_at - now_ms();
    assert!(lifetime_ms > 4 * 3600 * 1000 - 60_000 && lifetime_ms <= 4 * 3600 * 1000);

    // Static tokens are not persisted
    assert!(store.snapshot().await.is_none());
}

#[tokio::test]
async fn test_expired_static_token_requires_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.unused")))
        .expect(0)
        .mount(&server)
        .await;

    let expired = TokenState::from_static(
        "sl.static-token",
        Duration::from_secs(60),
        now_ms() - 3_600_000,
    );
    let (manager, _store) = setup_manager(&server, Some(expired)).await;

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_persisted_state_preferred_over_static_token() {
    let server = MockServer::start().await;
    let mut settings = test_settings(&server);
    settings.static_access_token = Some("sl.static-token".to_string());

    let store = Arc::new(MemoryTokenStore::with_state(create_test_state(3600)));
    let manager = TokenManager::load(&settings, store).await.unwrap();

    assert_eq!(
        manager.get_valid_access_token().await.unwrap(),
        "sl.current-access"
    );
}

/// Store that always fails, standing in for a broken disk or key
struct FailingStore;

#[async_trait]
impl TokenStore for FailingStore {
    async fn save(&self, _state: &TokenState) -> AuthResult<()> {
        Err(AuthError::Persistence("disk full".to_string()))
    }

    async fn load(&self) -> AuthResult<Option<TokenState>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_persistence_failure_after_exchange_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sl.exchanged")))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::load(&test_settings(&server), Arc::new(FailingStore))
        .await
        .unwrap();

    let err = manager.exchange_code("code", "verifier").await.unwrap_err();
    assert!(matches!(err, AuthError::Persistence(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_corrupted_store_fails_load() {
    struct CorruptStore;

    #[async_trait]
    impl TokenStore for CorruptStore {
        async fn save(&self, _state: &TokenState) -> AuthResult<()> {
            Ok(())
        }

        async fn load(&self) -> AuthResult<Option<TokenState>> {
            Err(AuthError::Persistence("Token file is corrupted".to_string()))
        }
    }

    let server = MockServer::start().await;
    let mut settings = test_settings(&server);
    settings.static_access_token = Some("sl.static-token".to_string());

    let result = TokenManager::load(&settings, Arc::new(CorruptStore)).await;
    assert!(matches!(result, Err(AuthError::Persistence(_))));
}
