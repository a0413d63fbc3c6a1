//! At-rest encryption for stored content decryption keys.
//!
//! A single AES-256-GCM key is derived once from an operator-configured
//! secret via PBKDF2-HMAC-SHA256. The salt is fixed and public, so the
//! secret itself supplies all the entropy; the slow KDF only hardens a weak
//! secret against brute force.
//!
//! Stored values are tagged with a version prefix. Untagged values are
//! legacy plaintext from records written before at-rest encryption existed;
//! the ambiguity is resolved once, at parse time, into an explicit
//! [`StoredKey`] variant rather than sniffed ad hoc at every call site.
//!
//! Running without a secret is possible but must be requested explicitly
//! with [`KeyCipher::unencrypted`], which logs a loud warning. Deployments
//! that pick this trade confidentiality for availability and should say so
//! in their runbooks.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use tracing::{error, warn};

use crate::errors::{PaywallError, Result};

/// PBKDF2 iteration count for key derivation.
pub const KDF_ITERATIONS: u32 = 100_000;

/// Fixed, non-secret KDF salt. Versioned with the stored-form prefix.
const KDF_SALT: &[u8] = b"xmr-paywall-at-rest-v1";

/// Prefix tagging an encrypted stored value.
const STORED_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A stored key value, resolved into its explicit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    /// Legacy record written before at-rest encryption
    Plaintext(String),
    /// Tagged ciphertext: base64(nonce ‖ tag ‖ ciphertext)
    Encrypted(String),
}

impl StoredKey {
    /// Classifies a stored value by its tag.
    pub fn parse(stored: &str) -> Self {
        match stored.strip_prefix(STORED_PREFIX) {
            Some(body) => StoredKey::Encrypted(body.to_string()),
            None => StoredKey::Plaintext(stored.to_string()),
        }
    }
}

/// Encrypts and decrypts content decryption keys at rest.
#[derive(Clone)]
pub struct KeyCipher {
    key: Option<[u8; 32]>,
}

impl KeyCipher {
    /// Creates a cipher from the operator secret.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(PaywallError::Config(
                "at-rest encryption secret must not be empty".to_string(),
            ));
        }

        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
        Ok(Self { key: Some(key) })
    }

    /// Creates a passthrough cipher that stores keys unencrypted.
    ///
    /// This is an explicit opt-in: keys written through this cipher are
    /// readable by anyone with access to the backing store.
    pub fn unencrypted() -> Self {
        warn!(
            "at-rest key encryption is DISABLED - stored decryption keys \
             are plaintext; configure an operator secret for production"
        );
        Self { key: None }
    }

    /// Encrypts a plaintext key for storage.
    ///
    /// Returns `"enc:v1:" + base64(nonce ‖ tag ‖ ciphertext)` with a fresh
    /// random 12-byte nonce, or the plaintext unchanged when running
    /// unencrypted.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let Some(key) = &self.key else {
            warn!("storing decryption key without at-rest encryption");
            return Ok(plaintext.to_string());
        };

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext_with_tag = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| PaywallError::Config("at-rest encryption failed".to_string()))?;

        // AES-GCM appends the tag; the stored layout puts it up front.
        let split = ciphertext_with_tag.len() - TAG_LEN;
        let (ciphertext, tag) = ciphertext_with_tag.split_at(split);

        let mut packed = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(tag);
        packed.extend_from_slice(ciphertext);

        Ok(format!("{STORED_PREFIX}{}", BASE64.encode(packed)))
    }

    /// Decrypts a stored key back to its plaintext form.
    ///
    /// Legacy untagged values are returned unchanged. Decrypting a tagged
    /// value with no secret configured is a fatal configuration error.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let body = match StoredKey::parse(stored) {
            StoredKey::Plaintext(value) => return Ok(value),
            StoredKey::Encrypted(body) => body,
        };

        let Some(key) = &self.key else {
            error!("encrypted key found but no at-rest secret is configured");
            return Err(PaywallError::Config(
                "cannot decrypt stored key: no at-rest encryption secret configured".to_string(),
            ));
        };

        let packed = BASE64.decode(body.as_bytes())?;
        if packed.len() < NONCE_LEN + TAG_LEN {
            return Err(PaywallError::Config(
                "stored key ciphertext is truncated".to_string(),
            ));
        }

        let (nonce_bytes, rest) = packed.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut ciphertext_with_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        ciphertext_with_tag.extend_from_slice(ciphertext);
        ciphertext_with_tag.extend_from_slice(tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                ciphertext_with_tag.as_slice(),
            )
            .map_err(|_| {
                PaywallError::Config("stored key failed authentication".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| PaywallError::Config("decrypted key is not valid UTF-8".to_string()))
    }
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("KeyCipher")
            .field("encrypted", &self.key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = KeyCipher::new("operator secret").unwrap();
        let plaintext = "c29tZSBiYXNlNjQga2V5IG1hdGVyaWFs";

        let stored = cipher.encrypt(plaintext).unwrap();
        assert!(stored.starts_with("enc:v1:"));
        assert_ne!(stored, plaintext);

        assert_eq!(cipher.decrypt(&stored).unwrap(), plaintext);
    }

    #[test]
    fn test_fresh_nonce_per_encrypt() {
        let cipher = KeyCipher::new("operator secret").unwrap();
        let a = cipher.encrypt("same input").unwrap();
        let b = cipher.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_plaintext_passthrough() {
        let cipher = KeyCipher::new("operator secret").unwrap();
        let legacy = "legacy-unencrypted-key";
        assert_eq!(cipher.decrypt(legacy).unwrap(), legacy);
    }

    #[test]
    fn test_unencrypted_passthrough() {
        let cipher = KeyCipher::unencrypted();
        let stored = cipher.encrypt("plain").unwrap();
        assert_eq!(stored, "plain");
        assert_eq!(cipher.decrypt(&stored).unwrap(), "plain");
    }

    #[test]
    fn test_encrypted_value_without_secret_is_fatal() {
        let with_secret = KeyCipher::new("operator secret").unwrap();
        let stored = with_secret.encrypt("key").unwrap();

        let without = KeyCipher::unencrypted();
        let result = without.decrypt(&stored);
        assert!(matches!(result, Err(PaywallError::Config(_))));
    }

    #[test]
    fn test_wrong_secret_fails_authentication() {
        let a = KeyCipher::new("secret a").unwrap();
        let b = KeyCipher::new("secret b").unwrap();

        let stored = a.encrypt("key").unwrap();
        assert!(matches!(b.decrypt(&stored), Err(PaywallError::Config(_))));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let cipher = KeyCipher::new("operator secret").unwrap();
        let stored = format!("enc:v1:{}", BASE64.encode([0u8; 8]));
        assert!(matches!(cipher.decrypt(&stored), Err(PaywallError::Config(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            KeyCipher::new(""),
            Err(PaywallError::Config(_))
        ));
    }

    #[test]
    fn test_stored_key_parse() {
        assert_eq!(
            StoredKey::parse("enc:v1:abc"),
            StoredKey::Encrypted("abc".to_string())
        );
        assert_eq!(
            StoredKey::parse("plain value"),
            StoredKey::Plaintext("plain value".to_string())
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = KeyCipher::new("operator secret").unwrap();
        let debug = format!("{cipher:?}");
        assert!(!debug.contains("operator"));
        assert!(debug.contains("encrypted: true"));
    }
}
