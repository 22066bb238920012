// ABOUTME: Storage layer for the OAuth token state
// ABOUTME: Encrypted single-file store with atomic replace, plus an in-memory store

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokenvault_config::Settings;
use tokenvault_security::{EncryptionError, SealedPayload, TokenCipher};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

use crate::{
    error::{AuthError, AuthResult},
    oauth::types::TokenState,
};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persistence seam for the token state
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the state, replacing any previous value
    async fn save(&self, state: &TokenState) -> AuthResult<()>;

    /// Load the persisted state; `None` only when nothing was ever saved
    async fn load(&self) -> AuthResult<Option<TokenState>>;
}

/// Token state encrypted with ChaCha20-Poly1305 in a single JSON file
#[derive(Debug)]
pub struct EncryptedTokenStore {
    path: PathBuf,
    cipher: Result<TokenCipher, EncryptionError>,
}

impl EncryptedTokenStore {
    /// Create a store at `path` keyed by `secret`.
    ///
    /// A missing or invalid secret is reported on first use, not here.
    pub fn new(path: impl Into<PathBuf>, secret: Option<&str>) -> Self {
        let cipher = match secret {
            Some(secret) => TokenCipher::from_secret(secret),
            None => Err(EncryptionError::KeyDerivation(
                "TOKEN_ENCRYPTION_KEY is not set".to_string(),
            )),
        };

        Self {
            path: path.into(),
            cipher,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.token_store_path.clone(),
            settings.encryption_key.as_deref(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cipher(&self) -> AuthResult<&TokenCipher> {
        self.cipher
            .as_ref()
            .map_err(|e| AuthError::Persistence(format!("Invalid encryption key: {}", e)))
    }

    /// Unique sibling path so concurrent writers never share a temp file
    fn temp_path(&self) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.tmp", std::process::id(), seq));
        self.path.with_file_name(name)
    }
}

async fn write_restricted(path: &Path, contents: &[u8]) -> AuthResult<()> {
    fs::write(path, contents)
        .await
        .map_err(|e| AuthError::Persistence(format!("Failed to write token file: {}", e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| AuthError::Persistence(format!("Failed to restrict token file: {}", e)))?;
    }

    Ok(())
}

#[async_trait]
impl TokenStore for EncryptedTokenStore {
    async fn save(&self, state: &TokenState) -> AuthResult<()> {
        debug!("Storing token state at {}", self.path.display());

        let cipher = self.cipher()?;

        let plaintext = serde_json::to_vec(state)
            .map_err(|e| AuthError::Persistence(format!("Failed to serialize token: {}", e)))?;
        let sealed = cipher.seal(&plaintext).map_err(|e| {
            error!("Failed to encrypt token state: {}", e);
            AuthError::Persistence(format!("Token encryption failed: {}", e))
        })?;
        let contents = serde_json::to_vec(&sealed)
            .map_err(|e| AuthError::Persistence(format!("Failed to encode token file: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::Persistence(format!("Failed to create token directory: {}", e))
            })?;
        }

        // Write to a sibling file and rename so readers never see a partial file
        let temp_path = self.temp_path();
        if let Err(e) = write_restricted(&temp_path, &contents).await {
            // Best-effort cleanup
            let _ = fs::remove_file(&temp_path).await;
            error!("Failed to write token file: {}", e);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            error!("Failed to replace token file: {}", e);
            return Err(AuthError::Persistence(format!(
                "Failed to replace token file: {}",
                e
            )));
        }

        debug!("Successfully stored encrypted token state");
        Ok(())
    }

    async fn load(&self) -> AuthResult<Option<TokenState>> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(AuthError::Persistence(format!(
                    "Failed to read token file: {}",
                    e
                )))
            }
        };

        let sealed: SealedPayload = serde_json::from_slice(&contents).map_err(|e| {
            error!("Token file is corrupted: {}", e);
            AuthError::Persistence(format!("Token file is corrupted: {}", e))
        })?;

        let plaintext = self.cipher()?.open(&sealed).map_err(|e| {
            error!("Failed to decrypt token file: {}", e);
            AuthError::Persistence(format!(
                "Token decryption failed (corrupted file or wrong key): {}",
                e
            ))
        })?;

        let state: TokenState = serde_json::from_slice(&plaintext).map_err(|e| {
            AuthError::Persistence(format!("Decrypted token state is invalid: {}", e))
        })?;

        debug!("Loaded and decrypted token state");
        Ok(Some(state))
    }
}

/// In-process token store without disk persistence
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<Option<TokenState>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: TokenState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved state
    pub async fn snapshot(&self) -> Option<TokenState> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, state: &TokenState) -> AuthResult<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> AuthResult<Option<TokenState>> {
        Ok(self.state.lock().await.clone())
    }
}
