//! Encryption-at-rest for exchange API credentials
//!
//! Small AES-256-GCM utility: credentials are stored as
//! `base64(nonce || ciphertext)` and decrypted on demand into
//! [`Zeroizing`] buffers so plaintext lives only for the duration of a
//! single signing call.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption key is not valid base64: {0}")]
    InvalidKeyEncoding(String),

    #[error("stored ciphertext is malformed")]
    MalformedCiphertext,

    #[error("decryption failed: wrong key or corrupt ciphertext")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Symmetric cipher wrapping the service-wide credential encryption key.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Build a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key.len(),
            });
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Build a cipher from a base64-encoded 32-byte key, as configured in
    /// the environment.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let key = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?,
        );
        Self::new(&key)
    }

    /// Encrypt a plaintext secret for storage.
    ///
    /// Output format: `base64(nonce || ciphertext)`, a fresh random nonce
    /// per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(payload))
    }

    /// Decrypt a stored secret.
    ///
    /// A failure here is unrecoverable for the current call (wrong key
    /// material or corrupt ciphertext) and must propagate; forwarding
    /// garbage credentials to the exchange is never acceptable.
    pub fn decrypt(&self, stored: &str) -> Result<Zeroizing<String>, CryptoError> {
        let payload = general_purpose::STANDARD
            .decode(stored.trim())
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        if payload.len() <= NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext);
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed)?,
        );

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let c = cipher();
        let stored = c.encrypt("binance-api-secret-0123456789").unwrap();
        assert_ne!(stored, "binance-api-secret-0123456789");
        let plaintext = c.decrypt(&stored).unwrap();
        assert_eq!(&*plaintext, "binance-api-secret-0123456789");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let c = cipher();
        let a = c.encrypt("secret").unwrap();
        let b = c.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let stored = cipher().encrypt("secret").unwrap();
        let other = SecretCipher::new(&[8u8; 32]).unwrap();
        assert!(matches!(
            other.decrypt(&stored),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_corrupt_ciphertext_fails() {
        let c = cipher();
        assert!(matches!(
            c.decrypt("not base64 at all!"),
            Err(CryptoError::MalformedCiphertext)
        ));
        assert!(matches!(
            c.decrypt("c2hvcnQ="),
            Err(CryptoError::MalformedCiphertext)
        ));

        let mut stored = c.encrypt("secret").unwrap();
        // Flip the last character of the payload.
        let flipped = if stored.ends_with('A') { "B" } else { "A" };
        stored.replace_range(stored.len() - 1.., flipped);
        assert!(c.decrypt(&stored).is_err());
    }

    #[test]
    fn test_key_length_is_enforced() {
        assert!(matches!(
            SecretCipher::new(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_from_base64() {
        use base64::{engine::general_purpose, Engine as _};
        let encoded = general_purpose::STANDARD.encode([9u8; 32]);
        let c = SecretCipher::from_base64(&encoded).unwrap();
        let stored = c.encrypt("secret").unwrap();
        assert_eq!(&*c.decrypt(&stored).unwrap(), "secret");

        assert!(SecretCipher::from_base64("%%%").is_err());
    }
}
