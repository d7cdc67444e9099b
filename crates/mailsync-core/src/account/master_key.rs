//! Vault master key storage in the system keyring.
//!
//! When no encryption key is configured, a random key is generated on first
//! use and kept in the platform's credential store:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use keyring::Entry;
use rand::RngCore;
use tracing::{debug, info};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailsync";

/// Keyring user for the vault master key.
const MASTER_KEY_USER: &str = "vault_master_key";

/// Returns the master key, creating and storing one if none exists.
///
/// # Errors
///
/// Returns an error if the keyring cannot be read or written.
pub fn load_or_create_master_key() -> keyring::Result<String> {
    let entry = Entry::new(SERVICE_NAME, MASTER_KEY_USER)?;
    match entry.get_password() {
        Ok(key) => {
            debug!("Loaded vault master key from keyring");
            Ok(key)
        }
        Err(keyring::Error::NoEntry) => {
            let key = generate_master_key();
            entry.set_password(&key)?;
            info!("Generated new vault master key and stored it in the keyring");
            Ok(key)
        }
        Err(e) => Err(e),
    }
}

/// Removes the stored master key. Missing entries are not an error.
///
/// Every stored password becomes unreadable afterwards.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn delete_master_key() -> keyring::Result<()> {
    let entry = Entry::new(SERVICE_NAME, MASTER_KEY_USER)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e),
    }
}

/// 24 random bytes, base64-encoded to exactly 32 characters.
fn generate_master_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_fills_aes_key() {
        let key = generate_master_key();
        assert_eq!(key.len(), 32);
        assert_ne!(key, generate_master_key());
    }

    #[test]
    #[ignore = "requires a system keyring"]
    fn test_master_key_is_stable() {
        let first = load_or_create_master_key().unwrap();
        let second = load_or_create_master_key().unwrap();
        assert_eq!(first, second);
        delete_master_key().unwrap();
    }
}
