//! Runtime token cryptography
//!
//! A project runtime token is stored twice, never as plaintext:
//!
//! - a keyed HMAC-SHA256 hash used to verify inbound credentials, and
//! - an AES-256-GCM sealed form so the dashboard can redisplay the token
//!   and rotation can invalidate the old value.
//!
//! Every seal generates a fresh random 96-bit nonce via the system CSPRNG;
//! the nonce is stored alongside the ciphertext in one base64 blob.

use crate::{Error, Result};
use base64::engine::general_purpose::{STANDARD as B64, URL_SAFE_NO_PAD as B64_URL};
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{constant_time, hmac};

/// Prefix for issued runtime tokens, so leaked credentials are recognizable
/// in logs and scanners.
pub const TOKEN_PREFIX: &str = "lsk_";

/// Generate a new runtime token: `lsk_` + 32 random bytes, base64url.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| Error::Crypto("failed to generate token bytes".to_string()))?;
    Ok(format!("{}{}", TOKEN_PREFIX, B64_URL.encode(bytes)))
}

/// Generate a random 32-byte key, base64-encoded for storage in settings.
pub fn generate_key_b64() -> Result<String> {
    let mut key = [0u8; 32];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| Error::Crypto("failed to generate key".to_string()))?;
    Ok(B64.encode(key))
}

/// Decode a base64 key from settings into raw key material.
pub fn decode_key_b64(encoded: &str) -> Result<[u8; 32]> {
    let bytes = B64
        .decode(encoded)
        .map_err(|e| Error::Crypto(format!("invalid stored key: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Crypto("stored key is not 32 bytes".to_string()))
}

/// Compute the stored verification hash for a token: base64(HMAC-SHA256).
pub fn hash_token(secret: &[u8], token: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, token.as_bytes());
    B64.encode(tag.as_ref())
}

/// Verify a presented token against a stored hash in constant time.
pub fn verify_token(secret: &[u8], token: &str, stored_hash: &str) -> bool {
    let stored = match B64.decode(stored_hash) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, token.as_bytes());
    constant_time::verify_slices_are_equal(tag.as_ref(), &stored).is_ok()
}

/// Constant-time comparison of two service secrets.
pub fn secrets_equal(a: &str, b: &str) -> bool {
    constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}

/// Encrypt a token for redisplay. Returns base64(nonce || ciphertext+tag).
pub fn seal_token(key: &[u8; 32], token: &str) -> Result<String> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let sealing = LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| Error::Crypto("failed to generate nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = token.as_bytes().to_vec();
    sealing
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Crypto("AES-256-GCM encryption failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);
    Ok(B64.encode(blob))
}

/// Decrypt a sealed token blob produced by [`seal_token`].
pub fn open_token(key: &[u8; 32], sealed: &str) -> Result<String> {
    let blob = B64
        .decode(sealed)
        .map_err(|e| Error::Crypto(format!("invalid sealed token: {}", e)))?;
    if blob.len() < NONCE_LEN {
        return Err(Error::Crypto("sealed token too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| Error::Crypto("invalid nonce".to_string()))?;

    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| Error::Crypto("failed to create AES-256-GCM key".to_string()))?;
    let opening = LessSafeKey::new(unbound);

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Crypto("AES-256-GCM decryption failed".to_string()))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| Error::Crypto("sealed token is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        decode_key_b64(&generate_key_b64().unwrap()).unwrap()
    }

    #[test]
    fn generated_tokens_carry_prefix_and_differ() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert!(a.starts_with(TOKEN_PREFIX));
        assert!(b.starts_with(TOKEN_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_verify_roundtrip() {
        let secret = b"test-hmac-secret";
        let token = generate_token().unwrap();
        let hash = hash_token(secret, &token);

        assert!(verify_token(secret, &token, &hash));
        assert!(!verify_token(secret, "lsk_wrong", &hash));
        assert!(!verify_token(b"other-secret", &token, &hash));
        assert!(!verify_token(secret, &token, "not-base64!!!"));
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let token = generate_token().unwrap();

        let sealed = seal_token(&key, &token).unwrap();
        let opened = open_token(&key, &sealed).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn seal_uses_fresh_nonce() {
        let key = test_key();
        let sealed1 = seal_token(&key, "lsk_same").unwrap();
        let sealed2 = seal_token(&key, "lsk_same").unwrap();
        assert_ne!(sealed1, sealed2);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal_token(&test_key(), "lsk_secret").unwrap();
        assert!(open_token(&test_key(), &sealed).is_err());
    }

    #[test]
    fn tampered_blob_fails() {
        let key = test_key();
        let sealed = seal_token(&key, "lsk_secret").unwrap();
        let mut blob = base64::engine::general_purpose::STANDARD
            .decode(&sealed)
            .unwrap();
        blob[NONCE_LEN] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(blob);
        assert!(open_token(&key, &tampered).is_err());
    }

    #[test]
    fn secrets_compare_equal_only_on_match() {
        assert!(secrets_equal("abc", "abc"));
        assert!(!secrets_equal("abc", "abd"));
        assert!(!secrets_equal("abc", "abcd"));
    }
}
