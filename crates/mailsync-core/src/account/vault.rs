//! Credential vault.
//!
//! Account passwords are stored as `base64(nonce || ciphertext || tag)` using
//! AES-256-GCM under a key derived from the configured secret. A fresh random
//! 96-bit nonce is drawn for every encryption, so equal passwords never produce
//! equal ciphertexts, and tampering is detected by the authentication tag.
//!
//! [`Vault::reveal`] fails closed: anything it cannot decrypt comes back as an
//! empty string, which the server then rejects as a bad login.

use aes_gcm::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;
use tracing::warn;

/// AES-256 key length.
const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Why a protected value could not be revealed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Not base64 or shorter than a nonce.
    #[error("Invalid protected value: {0}")]
    InvalidFormat(String),

    /// Wrong key or modified ciphertext.
    #[error("Decryption failed")]
    Decryption,

    /// Plaintext is not UTF-8.
    #[error("Decrypted value is not valid UTF-8")]
    NotUtf8,
}

/// Symmetric protector for stored credentials.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates a vault keyed by `secret`.
    ///
    /// The UTF-8 bytes of the secret are space-padded or truncated to 32
    /// bytes.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut key = [b' '; KEY_SIZE];
        let bytes = secret.as_bytes();
        let len = bytes.len().min(KEY_SIZE);
        key[..len].copy_from_slice(&bytes[..len]);
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Protects a plaintext credential. Empty input yields empty output.
    #[must_use]
    pub fn protect(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let Ok(ciphertext) = self.cipher.encrypt(nonce, plaintext.as_bytes()) else {
            warn!("credential encryption failed");
            return String::new();
        };

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        BASE64.encode(combined)
    }

    /// Reveals a protected credential, returning an empty string on any
    /// failure.
    #[must_use]
    pub fn reveal(&self, protected: &str) -> String {
        self.try_reveal(protected).unwrap_or_else(|e| {
            warn!("could not reveal stored credential: {e}");
            String::new()
        })
    }

    /// Reveals a protected credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is malformed, was produced under a
    /// different key, or has been modified.
    pub fn try_reveal(&self, protected: &str) -> Result<String, VaultError> {
        if protected.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(protected.trim())
            .map_err(|e| VaultError::InvalidFormat(e.to_string()))?;
        if combined.len() <= NONCE_SIZE {
            return Err(VaultError::InvalidFormat(format!(
                "{} bytes is too short",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::NotUtf8)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let vault = Vault::new("correct horse battery staple");
        let protected = vault.protect("hunter2");
        assert_ne!(protected, "hunter2");
        assert_eq!(vault.reveal(&protected), "hunter2");
    }

    #[test]
    fn test_empty_values() {
        let vault = Vault::new("k");
        assert_eq!(vault.protect(""), "");
        assert_eq!(vault.reveal(""), "");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let vault = Vault::new("k");
        assert_ne!(vault.protect("same"), vault.protect("same"));
    }

    #[test]
    fn test_invalid_input_fails_closed() {
        let vault = Vault::new("k");
        assert_eq!(vault.reveal("not-valid-base64"), "");
        assert_eq!(vault.reveal("c2hvcnQ="), "");
        assert!(matches!(
            vault.try_reveal("!!!"),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_wrong_key_and_tampering() {
        let protected = Vault::new("key one").protect("secret");
        assert_eq!(
            Vault::new("key two").try_reveal(&protected),
            Err(VaultError::Decryption)
        );

        let mut bytes = BASE64.decode(&protected).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert_eq!(Vault::new("key one").reveal(&tampered), "");
    }

    #[test]
    fn test_long_secret_is_truncated() {
        let a = Vault::new(&"x".repeat(40));
        let b = Vault::new(&"x".repeat(32));
        assert_eq!(b.reveal(&a.protect("pw")), "pw");
    }

    #[test]
    fn test_short_secret_is_space_padded() {
        let padded = format!("abc{}", " ".repeat(29));
        assert_eq!(Vault::new(&padded).reveal(&Vault::new("abc").protect("pw")), "pw");
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip_printable(secret in "[ -~]{0,200}") {
            let vault = Vault::new("property key");
            proptest::prop_assert_eq!(vault.reveal(&vault.protect(&secret)), secret);
        }

        #[test]
        fn prop_reveal_never_panics(input in "\\PC{0,80}") {
            let _ = Vault::new("k").reveal(&input);
        }
    }
}
