// ABOUTME: OAuth module managing the token lifecycle for the storage provider
// ABOUTME: Includes PKCE, failure classification, provider client, token storage, and the manager

pub mod classify;
pub mod manager;
pub mod pkce;
pub mod provider;
pub mod storage;
pub mod types;

pub use classify::{classify_refresh_failure, ProviderFailure};
pub use manager::TokenManager;
pub use provider::ProviderClient;
pub use storage::{EncryptedTokenStore, MemoryTokenStore, TokenStore};
pub use types::{AuthorizationRequest, PkceChallenge, TokenResponse, TokenState, TokenStatus};
