//! Single-value field encryption with the `ENC:` wire format.
//!
//! An encrypted field is `"ENC:" + base64(nonce || ciphertext)`. Any string
//! without the marker is plaintext. Field helpers never fail: encryption
//! errors keep the plaintext and decryption errors yield
//! [`DECRYPT_PLACEHOLDER`], so a crypto problem can never destroy data or
//! abort a save/load.

use crate::cipher::{self, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, KdfParams, derive_key};
use tracing::warn;

/// Prefix identifying an encrypted field value.
pub const CIPHERTEXT_MARKER: &str = "ENC:";

/// Shown in place of a field that could not be decrypted.
pub const DECRYPT_PLACEHOLDER: &str = "[decryption failed]";

/// Returns true if the value carries the ciphertext marker.
pub fn is_ciphertext(value: &str) -> bool {
    value.starts_with(CIPHERTEXT_MARKER)
}

/// Encrypts and decrypts field values under one derived key.
#[derive(Clone, Debug)]
pub struct FieldCipher {
    key: DerivedKey,
}

impl FieldCipher {
    /// Derives the field key for a passphrase.
    pub fn new(passphrase: &str, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self {
            key: derive_key(passphrase, params)?,
        })
    }

    /// Wraps an already-derived key.
    pub fn from_key(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Encrypts a value, surfacing failures.
    ///
    /// Empty input is returned unchanged.
    pub fn try_encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let sealed = cipher::encrypt(&self.key, plaintext.as_bytes())?;
        Ok(format!("{CIPHERTEXT_MARKER}{}", sealed.to_base64()))
    }

    /// Decrypts a value, surfacing failures.
    ///
    /// Values without the marker are returned unchanged.
    pub fn try_decrypt(&self, value: &str) -> CryptoResult<String> {
        let Some(encoded) = value.strip_prefix(CIPHERTEXT_MARKER) else {
            return Ok(value.to_string());
        };
        let sealed = EncryptedData::from_base64(encoded)?;
        let plaintext = cipher::decrypt(&self.key, &sealed)?;
        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
    }

    /// Encrypts a value, keeping the plaintext on failure.
    pub fn encrypt(&self, plaintext: &str) -> String {
        self.try_encrypt(plaintext).unwrap_or_else(|e| {
            warn!("field encryption failed, keeping plaintext: {e}");
            plaintext.to_string()
        })
    }

    /// Decrypts a value, yielding [`DECRYPT_PLACEHOLDER`] on failure.
    pub fn decrypt(&self, value: &str) -> String {
        self.try_decrypt(value).unwrap_or_else(|e| {
            warn!("field decryption failed: {e}");
            DECRYPT_PLACEHOLDER.to_string()
        })
    }
}

/// Encrypts one field value under a passphrase-derived key.
///
/// Derives the key on every call; use [`FieldCipher`] for batches.
pub fn encrypt_field(plaintext: &str, passphrase: &str) -> String {
    encrypt_field_with(plaintext, passphrase, &KdfParams::default())
}

/// Decrypts one field value under a passphrase-derived key.
pub fn decrypt_field(value: &str, passphrase: &str) -> String {
    decrypt_field_with(value, passphrase, &KdfParams::default())
}

/// [`encrypt_field`] with explicit key derivation parameters.
pub fn encrypt_field_with(plaintext: &str, passphrase: &str, params: &KdfParams) -> String {
    if plaintext.is_empty() {
        return String::new();
    }
    match FieldCipher::new(passphrase, params) {
        Ok(cipher) => cipher.encrypt(plaintext),
        Err(e) => {
            warn!("field key derivation failed, keeping plaintext: {e}");
            plaintext.to_string()
        }
    }
}

/// [`decrypt_field`] with explicit key derivation parameters.
pub fn decrypt_field_with(value: &str, passphrase: &str, params: &KdfParams) -> String {
    if !is_ciphertext(value) {
        return value.to_string();
    }
    match FieldCipher::new(passphrase, params) {
        Ok(cipher) => cipher.decrypt(value),
        Err(e) => {
            warn!("field key derivation failed: {e}");
            DECRYPT_PLACEHOLDER.to_string()
        }
    }
}
