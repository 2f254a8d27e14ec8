//! Randomized AEAD encryption.
//!
//! Fields declared with the random algorithm, and every queryable-encryption
//! field, are encrypted with ChaCha20-Poly1305 under a fresh 96-bit nonce, so
//! two encryptions of the same plaintext never share a ciphertext.

use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Nonce,
};
use secrecy::{ExposeSecret, SecretVec};

use crate::error::Error;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits).
pub const AEAD_KEY_SIZE: usize = 32;

/// Randomized encryption with ChaCha20-Poly1305.
///
/// # Example
///
/// ```
/// use fieldvault::randomized::RandomizedCipher;
/// use secrecy::SecretVec;
///
/// let cipher = RandomizedCipher::new(SecretVec::new(vec![1u8; 32])).unwrap();
/// let nonce = RandomizedCipher::generate_nonce();
///
/// let ciphertext = cipher.encrypt(&nonce, b"212-867-5309", b"aad").unwrap();
/// let plaintext = cipher.decrypt(&nonce, &ciphertext, b"aad").unwrap();
/// assert_eq!(plaintext, b"212-867-5309");
/// ```
pub struct RandomizedCipher {
    key: SecretVec<u8>,
}

impl RandomizedCipher {
    /// Creates a cipher from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKeyLength` if the key is not 32 bytes.
    pub fn new(key: SecretVec<u8>) -> Result<Self, Error> {
        if key.expose_secret().len() != AEAD_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: AEAD_KEY_SIZE,
                actual: key.expose_secret().len(),
            });
        }
        Ok(Self { key })
    }

    /// Generates a random nonce.
    #[must_use]
    pub fn generate_nonce() -> [u8; NONCE_SIZE] {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        nonce_bytes
    }

    /// Encrypts plaintext under the given nonce.
    ///
    /// # Arguments
    ///
    /// * `nonce` - A nonce that is never reused with this key
    /// * `plaintext` - Data to encrypt
    /// * `aad` - Associated data bound to the ciphertext
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if the AEAD operation fails.
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {e}")))?;

        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|e| Error::EncryptionFailed(format!("ChaCha20-Poly1305 encryption failed: {e}")))
    }

    /// Decrypts ciphertext.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The nonce has the wrong size
    /// - Authentication fails (wrong key, nonce or associated data, or tampering)
    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {e}")))?;

        let nonce_bytes: [u8; NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_| Error::DecryptionFailed("Invalid nonce size".to_string()))?;

        cipher
            .decrypt(&Nonce::from(nonce_bytes), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::AuthenticationFailed)
    }
}

impl Clone for RandomizedCipher {
    fn clone(&self) -> Self {
        Self { key: SecretVec::new(self.key.expose_secret().clone()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"CSFLE|people|contacts.mobile";

    fn create_test_cipher() -> RandomizedCipher {
        RandomizedCipher::new(SecretVec::new(vec![42u8; AEAD_KEY_SIZE])).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = create_test_cipher();
        let nonce = RandomizedCipher::generate_nonce();

        let ciphertext = cipher.encrypt(&nonce, b"212-867-5309", AAD).expect("Encryption failed");
        let decrypted = cipher.decrypt(&nonce, &ciphertext, AAD).expect("Decryption failed");

        assert_eq!(b"212-867-5309", &decrypted[..]);
    }

    #[test]
    fn test_fresh_nonces_give_different_ciphertexts() {
        let cipher = create_test_cipher();

        let ct1 = cipher.encrypt(&RandomizedCipher::generate_nonce(), b"secret", AAD).unwrap();
        let ct2 = cipher.encrypt(&RandomizedCipher::generate_nonce(), b"secret", AAD).unwrap();

        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let cipher = create_test_cipher();
        let nonce = RandomizedCipher::generate_nonce();

        let ciphertext = cipher.encrypt(&nonce, b"secret", AAD).unwrap();
        let result = cipher.decrypt(&nonce, &ciphertext, b"CSFLE|people|ssn");

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let cipher = create_test_cipher();
        let nonce = RandomizedCipher::generate_nonce();

        let mut ciphertext = cipher.encrypt(&nonce, b"secret", AAD).unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        assert!(cipher.decrypt(&nonce, &ciphertext, AAD).is_err());
    }

    #[test]
    fn test_bad_nonce_size() {
        let cipher = create_test_cipher();
        let result = cipher.decrypt(&[0u8; 8], b"whatever", AAD);
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_large_plaintext() {
        let cipher = create_test_cipher();
        let nonce = RandomizedCipher::generate_nonce();
        let plaintext = vec![42u8; 10000];

        let ciphertext = cipher.encrypt(&nonce, &plaintext, AAD).unwrap();
        assert_eq!(cipher.decrypt(&nonce, &ciphertext, AAD).unwrap(), plaintext);
    }

    #[test]
    fn test_invalid_key_length() {
        let result = RandomizedCipher::new(SecretVec::new(vec![0u8; 16]));
        assert!(matches!(result, Err(Error::InvalidKeyLength { expected: 32, actual: 16 })));
    }
}
