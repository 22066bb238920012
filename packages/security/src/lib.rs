// ABOUTME: Encryption primitives for Tokenvault
// ABOUTME: Provides the AEAD cipher used to protect the token file at rest

pub mod encryption;

// Re-export main types for convenience
pub use encryption::{EncryptionError, SealedPayload, TokenCipher};
