use base64::{Engine, engine::general_purpose::STANDARD};
use clinicstack_crypto::{
    CryptoError, EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt, encrypt, generate_random_key,
};

#[test]
fn encrypt_decrypt_roundtrip() {
    let key = generate_random_key();
    let plaintext = b"+60 12-345 6789";
    let encrypted = encrypt(&key, plaintext).unwrap();
    let decrypted = decrypt(&key, &encrypted).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn wrong_key_fails_decryption() {
    let key1 = generate_random_key();
    let key2 = generate_random_key();
    let encrypted = encrypt(&key1, b"Secret").unwrap();
    assert!(matches!(decrypt(&key2, &encrypted), Err(CryptoError::Decryption(_))));
}

#[test]
fn tampered_tag_fails_decryption() {
    let key = generate_random_key();
    let mut encrypted = encrypt(&key, b"Secret").unwrap();
    let last = encrypted.ciphertext.len() - 1;
    encrypted.ciphertext[last] ^= 0x01;
    assert!(decrypt(&key, &encrypted).is_err());
}

#[test]
fn every_call_uses_a_fresh_nonce() {
    let key = generate_random_key();
    let e1 = encrypt(&key, b"Same").unwrap();
    let e2 = encrypt(&key, b"Same").unwrap();
    assert_ne!(e1.nonce, e2.nonce);
    assert_ne!(e1.ciphertext, e2.ciphertext);
}

// ── EncryptedData ────────────────────────────────────────────────

#[test]
fn byte_layout_is_nonce_then_ciphertext() {
    let key = generate_random_key();
    let encrypted = encrypt(&key, b"test").unwrap();
    let bytes = encrypted.to_bytes();

    assert_eq!(bytes.len(), encrypted.len());
    assert_eq!(&bytes[..NONCE_SIZE], &encrypted.nonce);
    assert_eq!(&bytes[NONCE_SIZE..], encrypted.ciphertext.as_slice());
    assert_eq!(encrypted.ciphertext.len(), 4 + TAG_SIZE);
}

#[test]
fn base64_roundtrip() {
    let key = generate_random_key();
    let encrypted = encrypt(&key, b"Data").unwrap();
    let decoded = EncryptedData::from_base64(&encrypted.to_base64()).unwrap();
    assert_eq!(decoded, encrypted);
}

#[test]
fn too_short_payload_is_invalid_format() {
    // Less than NONCE_SIZE + TAG_SIZE = 28 bytes
    let short = STANDARD.encode([0u8; 10]);
    assert!(matches!(
        EncryptedData::from_base64(&short),
        Err(CryptoError::InvalidFormat(_))
    ));
}

#[test]
fn invalid_base64_is_invalid_format() {
    assert!(matches!(
        EncryptedData::from_base64("!!!not-base64!!!"),
        Err(CryptoError::InvalidFormat(_))
    ));
}

#[test]
fn empty_ciphertext_reports_empty() {
    let ed = EncryptedData {
        nonce: [0u8; NONCE_SIZE],
        ciphertext: vec![],
    };
    assert!(ed.is_empty());
    assert_eq!(ed.len(), NONCE_SIZE);
}
