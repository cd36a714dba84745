//! Field-level encryption for the ClinicStack data layer.
//!
//! Sensitive record fields are encrypted individually before they reach any
//! persistent store, local or remote:
//! - [`derive_key`]: PBKDF2-HMAC-SHA256 over a fixed salt
//! - [`encrypt`] / [`decrypt`]: ChaCha20-Poly1305 AEAD, random 96-bit nonce
//! - [`FieldCipher`]: the `ENC:` string format for single values
//! - [`PiiCodec`]: the cipher applied to the PII allow-list of a record

mod cipher;
mod error;
mod field;
mod key;
mod pii;

pub use cipher::{EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use field::{
    CIPHERTEXT_MARKER, DECRYPT_PLACEHOLDER, FieldCipher, decrypt_field, decrypt_field_with,
    encrypt_field, encrypt_field_with, is_ciphertext,
};
pub use key::{
    DEFAULT_ITERATIONS, DerivedKey, FIELD_SALT, KEY_SIZE, KdfParams, derive_key,
    derive_key_with_salt, generate_random_key,
};
pub use pii::{
    DEFAULT_PASSPHRASE, PII_FIELDS, PiiCodec, decrypt_pii, decrypt_pii_with, encrypt_pii,
    encrypt_pii_with,
};
