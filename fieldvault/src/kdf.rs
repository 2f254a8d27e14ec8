//! Key derivation using HKDF (HMAC-based Key Derivation Function).
//!
//! A data encryption key (DEK) is 96 random bytes. Each encryption mode works
//! with its own sub-key, expanded from the DEK with HKDF-SHA256 and a
//! purpose label, so a single DEK never feeds two different primitives.

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

use crate::error::Error;

/// Data encryption key size in bytes.
pub const DEK_SIZE: usize = 96;

/// What a derived sub-key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// AES-256-SIV key for deterministic encryption (64 bytes).
    Deterministic,
    /// ChaCha20-Poly1305 key for randomized encryption (32 bytes).
    Randomized,
    /// HMAC-SHA256 key for equality tags (32 bytes).
    EqualityTag,
    /// Key-wrapping key derived from a master key (32 bytes).
    Wrap,
}

impl KeyPurpose {
    /// HKDF `info` label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Deterministic => "fieldvault/v1/deterministic",
            Self::Randomized => "fieldvault/v1/randomized",
            Self::EqualityTag => "fieldvault/v1/equality-tag",
            Self::Wrap => "fieldvault/v1/wrap",
        }
    }

    /// Output length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Deterministic => 64,
            Self::Randomized | Self::EqualityTag | Self::Wrap => 32,
        }
    }
}

/// Derives a purpose-specific sub-key from key material using HKDF.
///
/// # Arguments
///
/// * `ikm` - Input key material (a DEK or a master key)
/// * `purpose` - Selects the `info` label and output length
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the derivation fails.
///
/// # Example
///
/// ```
/// use fieldvault::kdf::{derive_subkey, generate_dek, KeyPurpose};
/// use secrecy::ExposeSecret;
///
/// let dek = generate_dek();
/// let key = derive_subkey(&dek, KeyPurpose::Deterministic).expect("derivation failed");
/// assert_eq!(key.expose_secret().len(), 64);
/// ```
pub fn derive_subkey(ikm: &SecretVec<u8>, purpose: KeyPurpose) -> Result<SecretVec<u8>, Error> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm.expose_secret());

    let mut okm = vec![0u8; purpose.key_len()];
    hkdf.expand(purpose.label().as_bytes(), &mut okm).map_err(|_| Error::KeyDerivation)?;

    Ok(SecretVec::new(okm))
}

/// Generates a random DEK.
///
/// This DEK must be wrapped by a key provider before it is stored.
///
/// # Example
///
/// ```
/// use fieldvault::kdf::{generate_dek, DEK_SIZE};
/// use secrecy::ExposeSecret;
///
/// let dek = generate_dek();
/// assert_eq!(dek.expose_secret().len(), DEK_SIZE);
/// ```
#[must_use]
pub fn generate_dek() -> SecretVec<u8> {
    use chacha20poly1305::aead::{rand_core::RngCore, OsRng};

    let mut dek = vec![0u8; DEK_SIZE];
    OsRng.fill_bytes(&mut dek);
    SecretVec::new(dek)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_subkey_deterministic() {
        let dek = SecretVec::new(vec![1u8; DEK_SIZE]);

        let key1 = derive_subkey(&dek, KeyPurpose::Randomized).expect("derivation failed");
        let key2 = derive_subkey(&dek, KeyPurpose::Randomized).expect("derivation failed");

        assert_eq!(key1.expose_secret(), key2.expose_secret());
    }

    #[test]
    fn test_purposes_yield_independent_keys() {
        let dek = SecretVec::new(vec![1u8; DEK_SIZE]);

        let random = derive_subkey(&dek, KeyPurpose::Randomized).unwrap();
        let tag = derive_subkey(&dek, KeyPurpose::EqualityTag).unwrap();
        let siv = derive_subkey(&dek, KeyPurpose::Deterministic).unwrap();

        assert_ne!(random.expose_secret(), tag.expose_secret());
        assert_ne!(&random.expose_secret()[..], &siv.expose_secret()[..32]);
    }

    #[test]
    fn test_subkey_lengths() {
        let dek = generate_dek();
        for purpose in [
            KeyPurpose::Deterministic,
            KeyPurpose::Randomized,
            KeyPurpose::EqualityTag,
            KeyPurpose::Wrap,
        ] {
            let key = derive_subkey(&dek, purpose).unwrap();
            assert_eq!(key.expose_secret().len(), purpose.key_len());
        }
    }

    #[test]
    fn test_different_deks_different_subkeys() {
        let dek1 = SecretVec::new(vec![1u8; DEK_SIZE]);
        let dek2 = SecretVec::new(vec![2u8; DEK_SIZE]);

        let key1 = derive_subkey(&dek1, KeyPurpose::Deterministic).unwrap();
        let key2 = derive_subkey(&dek2, KeyPurpose::Deterministic).unwrap();

        assert_ne!(key1.expose_secret(), key2.expose_secret());
    }

    #[test]
    fn test_generate_dek() {
        let dek1 = generate_dek();
        let dek2 = generate_dek();

        assert_ne!(dek1.expose_secret(), dek2.expose_secret());
        assert_eq!(dek1.expose_secret().len(), DEK_SIZE);
    }

    // RFC 5869 Appendix A.1, HKDF-SHA256 basic test case
    #[test]
    fn test_hkdf_rfc5869_test_case_1() {
        const IKM_HEX: &str = "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b";
        const SALT_HEX: &str = "000102030405060708090a0b0c";
        const INFO_HEX: &str = "f0f1f2f3f4f5f6f7f8f9";
        const EXPECTED_OKM_HEX: &str =
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865";

        let ikm = hex::decode(IKM_HEX).unwrap();
        let salt = hex::decode(SALT_HEX).unwrap();
        let info = hex::decode(INFO_HEX).unwrap();
        let expected_okm = hex::decode(EXPECTED_OKM_HEX).unwrap();

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm);
        let mut okm = vec![0u8; 42];
        hkdf.expand(&info, &mut okm).expect("HKDF expand failed");

        assert_eq!(okm, expected_okm);
    }
}
