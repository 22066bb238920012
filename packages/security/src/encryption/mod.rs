// ABOUTME: Token file encryption using ChaCha20-Poly1305 AEAD
// ABOUTME: Derives a 256-bit key from an operator-supplied secret with HKDF-SHA256
//
// SECURITY MODEL:
//
// - The operator supplies a secret (TOKEN_ENCRYPTION_KEY). It never touches disk.
// - A 256-bit key is derived from the secret with HKDF-SHA256 and a fixed
//   application salt, so the same secret always opens the same file.
// - Every seal uses a fresh random 96-bit nonce. The format version is bound
//   as associated data so a payload cannot be replayed under another layout.
// - Anyone holding the secret can decrypt the file; anyone without it can
//   neither read nor undetectably modify it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::{
    aead::{self, Aad, Nonce, UnboundKey},
    error::Unspecified,
    hkdf,
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Application salt for key derivation (constant, not secret)
const APP_SALT: &[u8] = b"tokenvault-token-file-encryption-v1";

/// HKDF info label binding derived keys to this use
const KEY_INFO: &[u8] = b"token-file-key";

/// Nonce size for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Minimum accepted secret length in bytes
pub const MIN_SECRET_LEN: usize = 16;

/// Current on-disk payload version
pub const PAYLOAD_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Failed to generate random data: {0}")]
    RandomGeneration(String),

    #[error("Failed to encrypt data: {0}")]
    Encryption(String),

    #[error("Failed to decrypt data: {0}")]
    Decryption(String),

    #[error("Failed to derive encryption key: {0}")]
    KeyDerivation(String),

    #[error("Invalid encrypted data format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(u8),
}

impl From<Unspecified> for EncryptionError {
    fn from(_: Unspecified) -> Self {
        EncryptionError::Encryption("Cryptographic operation failed".to_string())
    }
}

/// Encrypted payload as written to disk.
///
/// Binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub version: u8,
    pub nonce: String,
    pub tag: String,
    pub ciphertext: String,
}

/// Symmetric cipher keyed by an operator secret
pub struct TokenCipher {
    rng: SystemRandom,
    encryption_key: [u8; 32],
}

impl TokenCipher {
    /// Derive a cipher from an operator-supplied secret
    pub fn from_secret(secret: &str) -> Result<Self, EncryptionError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(EncryptionError::KeyDerivation(format!(
                "Encryption key must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, APP_SALT);
        let prk = salt.extract(secret.as_bytes());

        let mut encryption_key = [0u8; 32]; // 256-bit key
        prk.expand(&[KEY_INFO], hkdf::HKDF_SHA256)
            .map_err(|_| EncryptionError::KeyDerivation("HKDF expansion failed".to_string()))?
            .fill(&mut encryption_key)
            .map_err(|_| EncryptionError::KeyDerivation("Key fill failed".to_string()))?;

        debug!("Derived token file encryption key");
        Ok(Self {
            rng: SystemRandom::new(),
            encryption_key,
        })
    }

    /// Encrypt plaintext into a sealed payload with a fresh nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            EncryptionError::RandomGeneration("Failed to generate nonce".to_string())
        })?;
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)?;

        let sealing_key = self.key()?;

        let mut in_out = plaintext.to_vec();
        let tag = sealing_key
            .seal_in_place_separate_tag(nonce, Self::aad(PAYLOAD_VERSION), &mut in_out)
            .map_err(|_| EncryptionError::Encryption("Seal operation failed".to_string()))?;

        Ok(SealedPayload {
            version: PAYLOAD_VERSION,
            nonce: BASE64.encode(nonce_bytes),
            tag: BASE64.encode(tag.as_ref()),
            ciphertext: BASE64.encode(&in_out),
        })
    }

    /// Decrypt and authenticate a sealed payload
    pub fn open(&self, payload: &SealedPayload) -> Result<Vec<u8>, EncryptionError> {
        if payload.version != PAYLOAD_VERSION {
            return Err(EncryptionError::UnsupportedVersion(payload.version));
        }

        let nonce_bytes = decode_field("nonce", &payload.nonce)?;
        let tag = decode_field("tag", &payload.tag)?;
        let ciphertext = decode_field("ciphertext", &payload.ciphertext)?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(EncryptionError::InvalidFormat(format!(
                "nonce must be {} bytes",
                NONCE_SIZE
            )));
        }
        if tag.len() != aead::CHACHA20_POLY1305.tag_len() {
            return Err(EncryptionError::InvalidFormat(
                "authentication tag has wrong length".to_string(),
            ));
        }

        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| EncryptionError::InvalidFormat("bad nonce".to_string()))?;
        let opening_key = self.key()?;

        let mut in_out = ciphertext;
        in_out.extend_from_slice(&tag);

        let plaintext = opening_key
            .open_in_place(nonce, Self::aad(payload.version), &mut in_out)
            .map_err(|_| EncryptionError::Decryption("Open operation failed".to_string()))?;

        Ok(plaintext.to_vec())
    }

    fn key(&self) -> Result<aead::LessSafeKey, EncryptionError> {
        let unbound_key = UnboundKey::new(&aead::CHACHA20_POLY1305, &self.encryption_key)?;
        Ok(aead::LessSafeKey::new(unbound_key))
    }

    fn aad(version: u8) -> Aad<[u8; 1]> {
        Aad::from([version])
    }
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, EncryptionError> {
    BASE64
        .decode(value)
        .map_err(|_| EncryptionError::InvalidFormat(format!("{} is not valid base64", name)))
}
