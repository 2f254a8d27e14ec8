//! Deterministic encryption using AES-SIV for equality queries.
//!
//! AES-SIV (Synthetic IV) is a misuse-resistant authenticated encryption mode
//! that produces deterministic output for the same plaintext and associated
//! data. Fields declared with the deterministic algorithm are encrypted
//! here, which lets an equality filter be rewritten into a comparison of
//! ciphertexts.
//!
//! # Security Properties
//!
//! - **Deterministic**: Same plaintext + associated data → same ciphertext
//! - **Misuse-resistant**: Safe even with nonce reuse
//! - **Authenticated**: Provides confidentiality and authenticity
//! - **Context-bound**: Different fields produce different ciphertexts
//!
//! # Security Warning
//!
//! Deterministic encryption reveals equality patterns. Declare it only for
//! fields that must be searchable by exact match.

use aes_siv::{
    aead::{Aead, KeyInit, Payload},
    Aes256SivAead,
};
use secrecy::{ExposeSecret, SecretVec};

use crate::error::Error;

/// Key length required by AES-256-SIV.
pub const SIV_KEY_SIZE: usize = 64;

/// Deterministic encryption using AES-256-SIV.
///
/// # Example
///
/// ```
/// use fieldvault::deterministic::DeterministicCipher;
/// use secrecy::SecretVec;
///
/// let cipher = DeterministicCipher::new(SecretVec::new(vec![0u8; 64])).unwrap();
///
/// let ct1 = cipher.encrypt(b"555-55-5555", b"CSFLE|people|ssn").unwrap();
/// let ct2 = cipher.encrypt(b"555-55-5555", b"CSFLE|people|ssn").unwrap();
/// assert_eq!(ct1, ct2);
/// ```
pub struct DeterministicCipher {
    key: SecretVec<u8>,
}

impl DeterministicCipher {
    /// Creates a new deterministic cipher with the provided key.
    ///
    /// # Arguments
    ///
    /// * `key` - A 64-byte (512-bit) key for AES-256-SIV
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is not 64 bytes.
    pub fn new(key: SecretVec<u8>) -> Result<Self, Error> {
        if key.expose_secret().len() != SIV_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: SIV_KEY_SIZE,
                actual: key.expose_secret().len(),
            });
        }
        Ok(Self { key })
    }

    /// Encrypts plaintext deterministically.
    ///
    /// # Arguments
    ///
    /// * `plaintext` - The data to encrypt
    /// * `aad` - Associated data bound to the ciphertext
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = Aes256SivAead::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("Failed to create AES-SIV cipher: {e}")))?;

        // AES-SIV derives its IV from the input; the nonce stays empty
        cipher
            .encrypt(&Default::default(), Payload { msg: plaintext, aad })
            .map_err(|e| Error::EncryptionFailed(format!("AES-SIV encryption failed: {e}")))
    }

    /// Decrypts ciphertext produced with the same key and associated data.
    ///
    /// # Errors
    ///
    /// Returns `Error::AuthenticationFailed` if the ciphertext is corrupted
    /// or the associated data does not match.
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = Aes256SivAead::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::DecryptionFailed(format!("Failed to create AES-SIV cipher: {e}")))?;

        cipher
            .decrypt(&Default::default(), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::AuthenticationFailed)
    }
}

impl Clone for DeterministicCipher {
    fn clone(&self) -> Self {
        Self { key: SecretVec::new(self.key.expose_secret().clone()) }
    }
}
