//! Credential vault: symmetric encryption for OAuth tokens at rest
//!
//! Tokens are encrypted with AES-256-GCM under a single process-wide key
//! supplied at startup. The wire format is `base64(nonce || ciphertext)`
//! with a random 96-bit nonce per encryption. GCM authentication means any
//! tampering, truncation, or wrong key fails decryption outright rather than
//! yielding garbage.
//!
//! There is no plaintext fallback on decrypt failure and no key rotation:
//! losing the key makes every stored credential permanently undecryptable.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use zeroize::ZeroizeOnDrop;

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

/// Process-wide token vault. Cheap to clone-by-reference; hold it in an Arc.
#[derive(ZeroizeOnDrop)]
pub struct Vault {
    key: [u8; KEY_BYTES],
}

impl Vault {
    /// Build a vault from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> crate::error::Result<Self> {
        let raw = BASE64.decode(encoded.trim()).map_err(|_| {
            crate::error::CredentialError::InvalidKey(
                "vault key must be valid base64".to_string(),
            )
        })?;
        if raw.len() != KEY_BYTES {
            return Err(crate::error::CredentialError::InvalidKey(format!(
                "vault key must decode to {} bytes, got {}",
                KEY_BYTES,
                raw.len()
            ))
            .into());
        }

        let mut key = [0u8; KEY_BYTES];
        key.copy_from_slice(&raw);
        Ok(Self { key })
    }

    /// Generate a fresh random key, base64-encoded, for operator setup.
    pub fn generate_key() -> String {
        use rand::RngCore;
        let mut key = [0u8; KEY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Encrypt a token for storage.
    pub fn encrypt(&self, plaintext: &str) -> crate::error::Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| crate::error::CredentialError::InvalidKey("bad key length".to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| crate::error::CredentialError::Encrypt("AEAD failure".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a stored token.
    ///
    /// Fails with `CredentialError::Decrypt` on malformed input, a wrong key,
    /// or a failed authentication tag. Callers treat this as fatal for the
    /// operation; nothing in Roost falls back to treating the stored value
    /// as plaintext.
    pub fn decrypt(&self, stored: &str) -> crate::error::Result<String> {
        let raw = BASE64.decode(stored).map_err(|_| {
            crate::error::CredentialError::Decrypt("stored value is not base64".to_string())
        })?;
        if raw.len() <= NONCE_BYTES {
            return Err(crate::error::CredentialError::Decrypt(
                "stored value is too short".to_string(),
            )
            .into());
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| crate::error::CredentialError::InvalidKey("bad key length".to_string()))?;

        let (nonce, ciphertext) = raw.split_at(NONCE_BYTES);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                crate::error::CredentialError::Decrypt(
                    "authentication failed (tampered data or wrong key)".to_string(),
                )
            })?;

        String::from_utf8(plaintext).map_err(|_| {
            crate::error::CredentialError::Decrypt("decrypted bytes are not UTF-8".to_string())
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> Vault {
        Vault::from_base64_key(&Vault::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let vault = test_vault();
        for token in [
            "",
            "plain-bearer-token",
            "AAAAAAAAAAAAAAAAAAAAAMLheAAAAAAA0%2BuSeid%2BULvsea4JtiGRiSDSJSI%3DEUifiRBkKG5E2XzMDjRfl76ZC9Ub0wnz4XsNiRVBChTYbJcE3F",
            "token with spaces and \u{1F426}",
        ] {
            let encrypted = vault.encrypt(token).unwrap();
            assert_ne!(encrypted, token);
            assert_eq!(vault.decrypt(&encrypted).unwrap(), token);
        }
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let vault = test_vault();
        let a = vault.encrypt("same plaintext").unwrap();
        let b = vault.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_rejects_tampering() {
        let vault = test_vault();
        let encrypted = vault.encrypt("secret").unwrap();

        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        let result = vault.decrypt(&tampered);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("authentication failed"));
    }

    #[test]
    fn test_decrypt_rejects_wrong_key() {
        let encrypted = test_vault().encrypt("secret").unwrap();
        let other = test_vault();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_decrypt_rejects_plaintext_garbage() {
        let vault = test_vault();
        assert!(vault.decrypt("not-even-base64!!!").is_err());
        assert!(vault.decrypt("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(Vault::from_base64_key("not base64 !!").is_err());
        assert!(Vault::from_base64_key(&BASE64.encode([0u8; 16])).is_err());
        assert!(Vault::from_base64_key(&BASE64.encode([0u8; 32])).is_ok());
    }
}
