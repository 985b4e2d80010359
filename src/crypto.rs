//! Field encryption module using per-user AES-256-GCM
//!
//! Every string that crosses the store boundary (event summaries,
//! descriptions, locations, OAuth tokens) is encrypted under a key derived
//! from a process-wide master secret and the owning user's id, with
//! additional authenticated data binding the ciphertext to that user.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const MIN_TOKEN_LEN: usize = NONCE_LEN + TAG_LEN;

/// Domain separation for the HKDF derivation step.
const HKDF_SALT: &[u8] = b"chronos-sync/field-key/v1";

/// AAD prefix binding ciphertexts to the owning user.
const AAD_PREFIX: &[u8] = b"chronos-v1:";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("invalid master secret: {0}")]
    InvalidMasterSecret(String),
}

/// Secure wrapper for derived field keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey(Vec<u8>);

impl FieldKey {
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Process-wide encryption service. One instance per process, owned by the
/// runtime and shared by the store gateway and sync engine.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoService {
    master_secret: Vec<u8>,
}

impl CryptoService {
    /// Create the service from the configured master secret.
    pub fn new(master_secret: &str) -> Result<Self, CryptoError> {
        if master_secret.len() < 16 {
            return Err(CryptoError::InvalidMasterSecret(
                "master secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self {
            master_secret: master_secret.as_bytes().to_vec(),
        })
    }

    /// Derive the 32-byte field key for a user via HKDF-SHA256 with a fixed
    /// salt and the user id as the info string.
    pub fn derive_key(&self, user_id: Uuid) -> FieldKey {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), &self.master_secret);
        let mut okm = vec![0u8; KEY_LEN];
        hk.expand(user_id.to_string().as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        FieldKey(okm)
    }

    /// Encrypt a field value for a user, deriving the key on the fly.
    pub fn encrypt(&self, plaintext: &str, user_id: Uuid) -> Result<String, CryptoError> {
        let key = self.derive_key(user_id);
        self.encrypt_with_key(&key, plaintext, user_id)
    }

    /// Encrypt with a pre-derived key (interchangeable with [`encrypt`]).
    ///
    /// Produces `base64(nonce(12) || ciphertext || tag(16))`. The nonce is
    /// random and distinct per call, so equal plaintexts never share a
    /// ciphertext.
    ///
    /// [`encrypt`]: CryptoService::encrypt
    pub fn encrypt_with_key(
        &self,
        key: &FieldKey,
        plaintext: &str,
        user_id: Uuid,
    ) -> Result<String, CryptoError> {
        let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = build_aad(user_id);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt a field value for a user, deriving the key on the fly.
    pub fn decrypt(&self, token: &str, user_id: Uuid) -> Result<String, CryptoError> {
        let key = self.derive_key(user_id);
        self.decrypt_with_key(&key, token, user_id)
    }

    /// Decrypt with a pre-derived key. Fails with a decryption error on bad
    /// base64, truncated input, tag mismatch, or non-UTF-8 plaintext.
    pub fn decrypt_with_key(
        &self,
        key: &FieldKey,
        token: &str,
        user_id: Uuid,
    ) -> Result<String, CryptoError> {
        let combined = BASE64
            .decode(token)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))?;

        if combined.len() < MIN_TOKEN_LEN {
            return Err(CryptoError::InvalidFormat);
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_LEN]);
        let ciphertext = &combined[NONCE_LEN..];
        let aad = build_aad(user_id);

        let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}

fn build_aad(user_id: Uuid) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 36);
    aad.extend_from_slice(AAD_PREFIX);
    aad.extend_from_slice(user_id.to_string().as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> CryptoService {
        CryptoService::new("a-test-master-secret-of-decent-length").expect("valid test secret")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let svc = test_service();
        let user = Uuid::new_v4();

        let token = svc.encrypt("Standup with the team", user).expect("encrypt");
        let plaintext = svc.decrypt(&token, user).expect("decrypt");

        assert_eq!(plaintext, "Standup with the team");
    }

    #[test]
    fn test_empty_string_roundtrip() {
        let svc = test_service();
        let user = Uuid::new_v4();

        let token = svc.encrypt("", user).expect("encrypt");
        assert_eq!(svc.decrypt(&token, user).expect("decrypt"), "");
    }

    #[test]
    fn test_unicode_roundtrip() {
        let svc = test_service();
        let user = Uuid::new_v4();
        let input = "réunion à 14h — 会議 📅";

        let token = svc.encrypt(input, user).expect("encrypt");
        assert_eq!(svc.decrypt(&token, user).expect("decrypt"), input);
    }

    #[test]
    fn test_same_plaintext_distinct_ciphertexts() {
        let svc = test_service();
        let user = Uuid::new_v4();

        let t1 = svc.encrypt("same text", user).expect("encrypt");
        let t2 = svc.encrypt("same text", user).expect("encrypt");

        assert_ne!(t1, t2);
        assert_eq!(svc.decrypt(&t1, user).unwrap(), "same text");
        assert_eq!(svc.decrypt(&t2, user).unwrap(), "same text");
    }

    #[test]
    fn test_cross_user_decrypt_fails() {
        let svc = test_service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let token = svc.encrypt("private", alice).expect("encrypt");
        assert!(svc.decrypt(&token, bob).is_err());
    }

    #[test]
    fn test_prederived_key_interchangeable() {
        let svc = test_service();
        let user = Uuid::new_v4();
        let key = svc.derive_key(user);

        let via_key = svc
            .encrypt_with_key(&key, "either way", user)
            .expect("encrypt");
        assert_eq!(svc.decrypt(&via_key, user).unwrap(), "either way");

        let via_derive = svc.encrypt("either way", user).expect("encrypt");
        assert_eq!(
            svc.decrypt_with_key(&key, &via_derive, user).unwrap(),
            "either way"
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let svc = test_service();
        let user = Uuid::new_v4();

        let token = svc.encrypt("important", user).expect("encrypt");
        let mut raw = BASE64.decode(&token).unwrap();
        raw[NONCE_LEN] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(matches!(
            svc.decrypt(&tampered, user),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_input_fails() {
        let svc = test_service();
        let user = Uuid::new_v4();

        let short = BASE64.encode([0u8; NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(
            svc.decrypt(&short, user),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_bad_base64_fails() {
        let svc = test_service();
        let user = Uuid::new_v4();

        assert!(matches!(
            svc.decrypt("not base64!!!", user),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_short_master_secret_rejected() {
        assert!(CryptoService::new("too-short").is_err());
    }

    #[test]
    fn test_keys_differ_per_user() {
        let svc = test_service();
        let k1 = svc.derive_key(Uuid::new_v4());
        let k2 = svc.derive_key(Uuid::new_v4());
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }
}
