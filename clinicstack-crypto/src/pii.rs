//! PII codec: field encryption applied across records.
//!
//! Only fields on [`PII_FIELDS`] are ever touched. Everything else in a
//! record, including unknown fields and nested values, passes through as-is.
//! The codec never mutates its input.

use crate::error::CryptoResult;
use crate::field::{FieldCipher, is_ciphertext};
use crate::key::KdfParams;
use clinicstack_types::{Dataset, Record};
use serde_json::{Map, Value};
use tracing::warn;

/// Record fields holding personally identifiable information.
pub const PII_FIELDS: &[&str] = &[
    "phone",
    "nationalId",
    "address",
    "email",
    "emergencyContactName",
    "emergencyContactPhone",
];

/// Passphrase used when neither the caller nor the device settings provide one.
///
/// This is shared by every unconfigured installation, so it only hides data
/// from casual inspection. Configure a device passphrase for real protection.
pub const DEFAULT_PASSPHRASE: &str = "clinicstack-local-pii-default";

/// Encrypts and decrypts the PII fields of records under one passphrase.
#[derive(Clone, Debug)]
pub struct PiiCodec {
    cipher: FieldCipher,
}

impl PiiCodec {
    /// Picks the passphrase: explicit, then device setting, then the default.
    ///
    /// Empty strings count as absent.
    pub fn resolve<'a>(explicit: Option<&'a str>, setting: Option<&'a str>) -> &'a str {
        explicit
            .filter(|p| !p.is_empty())
            .or(setting.filter(|p| !p.is_empty()))
            .unwrap_or(DEFAULT_PASSPHRASE)
    }

    /// Creates a codec for a passphrase, deriving its key once.
    pub fn new(passphrase: &str, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self {
            cipher: FieldCipher::new(passphrase, params)?,
        })
    }

    /// Creates a codec around an existing field cipher.
    pub fn from_cipher(cipher: FieldCipher) -> Self {
        Self { cipher }
    }

    /// Encrypts the PII fields of an object.
    ///
    /// Non-objects (null, numbers, strings, booleans, arrays) come back
    /// unchanged. A field is encrypted only when it is a non-empty string not
    /// already carrying the ciphertext marker.
    pub fn encrypt_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(fields) => Value::Object(self.encrypt_fields(fields)),
            other => other.clone(),
        }
    }

    /// Decrypts the PII fields of an object, or of each object in an array.
    ///
    /// Only marker-prefixed strings are decrypted; a failure shows up as the
    /// decryption placeholder in that field alone.
    pub fn decrypt_value(&self, value: &Value) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.decrypt_value(v)).collect())
            }
            Value::Object(fields) => Value::Object(self.decrypt_fields(fields)),
            other => other.clone(),
        }
    }

    /// Encrypts the PII fields of a record.
    pub fn encrypt_record(&self, record: &Record) -> Record {
        Record::from(self.encrypt_fields(record.as_map()))
    }

    /// Decrypts the PII fields of a record.
    pub fn decrypt_record(&self, record: &Record) -> Record {
        Record::from(self.decrypt_fields(record.as_map()))
    }

    /// Decrypts every record of the named collections in a dataset.
    pub fn decrypt_dataset<S: AsRef<str>>(
        &self,
        mut dataset: Dataset,
        collections: &[S],
    ) -> Dataset {
        for (name, records) in dataset.iter_mut() {
            if !collections.iter().any(|c| c.as_ref() == name) {
                continue;
            }
            for record in records.iter_mut() {
                *record = self.decrypt_record(record);
            }
        }
        dataset
    }

    fn encrypt_fields(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        let mut out = fields.clone();
        for &name in PII_FIELDS {
            let Some(Value::String(plain)) = fields.get(name) else {
                continue;
            };
            if plain.is_empty() || is_ciphertext(plain) {
                continue;
            }
            match self.cipher.try_encrypt(plain) {
                Ok(sealed) => {
                    out.insert(name.to_string(), Value::String(sealed));
                }
                Err(e) => warn!(field = name, "keeping plaintext, encryption failed: {e}"),
            }
        }
        out
    }

    fn decrypt_fields(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        let mut out = fields.clone();
        for &name in PII_FIELDS {
            let Some(Value::String(sealed)) = fields.get(name) else {
                continue;
            };
            if is_ciphertext(sealed) {
                out.insert(name.to_string(), Value::String(self.cipher.decrypt(sealed)));
            }
        }
        out
    }
}

/// Encrypts the PII fields of a value.
///
/// The key comes from `passphrase`, then the device `setting`, then
/// [`DEFAULT_PASSPHRASE`].
pub fn encrypt_pii(value: &Value, passphrase: Option<&str>, setting: Option<&str>) -> Value {
    encrypt_pii_with(value, passphrase, setting, &KdfParams::default())
}

/// Decrypts the PII fields of a value, resolving the key like [`encrypt_pii`].
pub fn decrypt_pii(value: &Value, passphrase: Option<&str>, setting: Option<&str>) -> Value {
    decrypt_pii_with(value, passphrase, setting, &KdfParams::default())
}

/// [`encrypt_pii`] with explicit key derivation parameters.
pub fn encrypt_pii_with(
    value: &Value,
    passphrase: Option<&str>,
    setting: Option<&str>,
    params: &KdfParams,
) -> Value {
    if !value.is_object() {
        return value.clone();
    }
    match PiiCodec::new(PiiCodec::resolve(passphrase, setting), params) {
        Ok(codec) => codec.encrypt_value(value),
        Err(e) => {
            warn!("PII key derivation failed, record left as-is: {e}");
            value.clone()
        }
    }
}

/// [`decrypt_pii`] with explicit key derivation parameters.
pub fn decrypt_pii_with(
    value: &Value,
    passphrase: Option<&str>,
    setting: Option<&str>,
    params: &KdfParams,
) -> Value {
    if !value.is_object() && !value.is_array() {
        return value.clone();
    }
    match PiiCodec::new(PiiCodec::resolve(passphrase, setting), params) {
        Ok(codec) => codec.decrypt_value(value),
        Err(e) => {
            warn!("PII key derivation failed, record left as-is: {e}");
            value.clone()
        }
    }
}
