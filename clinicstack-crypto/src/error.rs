//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
///
/// Field-level helpers never surface these to callers: encryption failures
/// fall back to the plaintext and decryption failures to a placeholder.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The OS random source could not produce a nonce.
    #[error("random source unavailable: {0}")]
    RandomSource(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Value does not carry the ciphertext marker or is malformed.
    #[error("invalid ciphertext format: {0}")]
    InvalidFormat(String),
}
