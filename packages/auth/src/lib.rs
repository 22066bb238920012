// ABOUTME: Tokenvault authentication library managing OAuth tokens for a cloud-storage API
// ABOUTME: PKCE authorization, bounded refresh retry, and encrypted token persistence

pub mod error;
pub mod oauth;

// Re-export main types
pub use error::{AuthError, AuthResult, RefreshError, RefreshErrorKind};
pub use oauth::{
    AuthorizationRequest, EncryptedTokenStore, MemoryTokenStore, PkceChallenge, ProviderClient,
    TokenManager, TokenResponse, TokenState, TokenStatus, TokenStore,
};
