//! Equality tags for queryable encryption.
//!
//! Queryable-encryption fields are encrypted with a random nonce, so their
//! ciphertexts cannot be compared. Each indexed value additionally gets an
//! equality tag, `HMAC-SHA256(tag_key, context || value)[..16]`, which the
//! store keeps in the document's `__safeContent__` array. An equality filter
//! is answered by computing the tag of the searched value and matching it
//! against that array.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

use crate::context::IndexContext;
use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Equality tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Generates an equality tag.
///
/// # Arguments
///
/// * `tag_key` - Key derived from the field's DEK for tag generation
/// * `value` - Encoded plaintext value
/// * `context` - Index context for domain separation
///
/// # Errors
///
/// Returns `Error::TokenGenerationFailed` if the key is rejected by HMAC.
///
/// # Example
///
/// ```
/// use fieldvault::blind_index::{generate_equality_tag, TAG_SIZE};
/// use fieldvault::context::IndexContext;
/// use secrecy::SecretVec;
///
/// let key = SecretVec::new(vec![7u8; 32]);
/// let ctx = IndexContext::new("QE", "people", "ssn");
/// let tag = generate_equality_tag(&key, b"290-66-1234", &ctx).unwrap();
/// assert_eq!(tag.len(), TAG_SIZE);
/// ```
pub fn generate_equality_tag(
    tag_key: &SecretVec<u8>,
    value: &[u8],
    context: &IndexContext,
) -> Result<Vec<u8>, Error> {
    let mut mac = HmacSha256::new_from_slice(tag_key.expose_secret())
        .map_err(|e| Error::TokenGenerationFailed(format!("Invalid tag key: {e}")))?;

    // Length-prefix the context so (ctx, value) pairs cannot collide
    let context_str = context.to_string();
    mac.update(&(context_str.len() as u64).to_be_bytes());
    mac.update(context_str.as_bytes());
    mac.update(value);

    let bytes = mac.finalize().into_bytes();
    Ok(bytes[..TAG_SIZE].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_key(byte: u8) -> SecretVec<u8> {
        SecretVec::new(vec![byte; 32])
    }

    #[test]
    fn test_tag_deterministic() {
        let context = IndexContext::new("QE", "people", "ssn");

        let tag1 = generate_equality_tag(&tag_key(42), b"290-66-1234", &context).unwrap();
        let tag2 = generate_equality_tag(&tag_key(42), b"290-66-1234", &context).unwrap();

        assert_eq!(tag1, tag2);
        assert_eq!(tag1.len(), TAG_SIZE);
    }

    #[test]
    fn test_tag_different_values() {
        let context = IndexContext::new("QE", "people", "ssn");

        let tag1 = generate_equality_tag(&tag_key(42), b"290-66-1234", &context).unwrap();
        let tag2 = generate_equality_tag(&tag_key(42), b"555-55-5555", &context).unwrap();

        assert_ne!(tag1, tag2);
    }

    #[test]
    fn test_tag_different_fields() {
        let ssn = IndexContext::new("QE", "people", "ssn");
        let mobile = IndexContext::new("QE", "people", "contacts.mobile");

        let tag1 = generate_equality_tag(&tag_key(42), b"555", &ssn).unwrap();
        let tag2 = generate_equality_tag(&tag_key(42), b"555", &mobile).unwrap();

        assert_ne!(tag1, tag2);
    }

    #[test]
    fn test_tag_different_keys() {
        let context = IndexContext::new("QE", "people", "ssn");

        let tag1 = generate_equality_tag(&tag_key(1), b"555", &context).unwrap();
        let tag2 = generate_equality_tag(&tag_key(2), b"555", &context).unwrap();

        assert_ne!(tag1, tag2);
    }

    #[test]
    fn test_tag_empty_value() {
        let context = IndexContext::new("QE", "people", "ssn");
        let tag = generate_equality_tag(&tag_key(42), b"", &context).unwrap();
        assert_eq!(tag.len(), TAG_SIZE);
    }
}
