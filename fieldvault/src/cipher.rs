//! Field value encryption.
//!
//! [`FieldCipher`] turns a declared field value into an encrypted payload
//! (binary subtype 6) and back:
//!
//! 1. Check the runtime type against the declaration
//! 2. Encode the value as CBOR
//! 3. Fetch and unwrap the field's DEK from the key vault (cached)
//! 4. Encrypt under the mode's sub-key, binding header and field context as
//!    associated data
//! 5. Prefix the ciphertext with the payload header

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::SecretVec;
use tracing::debug;
use zeroize::Zeroizing;

use crate::algorithm::EncryptionMode;
use crate::blind_index::generate_equality_tag;
use crate::context::{EncryptionContext, IndexContext};
use crate::deterministic::DeterministicCipher;
use crate::error::Error;
use crate::header::PayloadHeader;
use crate::kdf::{derive_subkey, KeyPurpose};
use crate::key_vault::{KeyId, KeyVault};
use crate::randomized::RandomizedCipher;
use crate::schema::FieldDeclaration;
use crate::value::{Binary, Value};

/// Sub-keys of one unwrapped DEK.
struct DataKey {
    deterministic: DeterministicCipher,
    randomized: RandomizedCipher,
    tag_key: SecretVec<u8>,
}

impl DataKey {
    fn derive(dek: &SecretVec<u8>) -> Result<Self, Error> {
        Ok(Self {
            deterministic: DeterministicCipher::new(derive_subkey(dek, KeyPurpose::Deterministic)?)?,
            randomized: RandomizedCipher::new(derive_subkey(dek, KeyPurpose::Randomized)?)?,
            tag_key: derive_subkey(dek, KeyPurpose::EqualityTag)?,
        })
    }
}

/// Encrypts and decrypts field values with keys from a key vault.
pub struct FieldCipher {
    vault: KeyVault,
    keys: Mutex<HashMap<KeyId, Arc<DataKey>>>,
}

impl FieldCipher {
    /// Creates a cipher reading keys from `vault`.
    #[must_use]
    pub fn new(vault: KeyVault) -> Self {
        Self { vault, keys: Mutex::new(HashMap::new()) }
    }

    /// The key vault backing this cipher.
    #[must_use]
    pub const fn key_vault(&self) -> &KeyVault {
        &self.vault
    }

    /// Encrypts a declared field value.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` if the value does not have the declared
    /// type, `Error::KeyNotFound` if the declared key is missing from the
    /// vault, or a crypto error.
    pub fn encrypt_value(
        &self,
        value: &Value,
        declaration: &FieldDeclaration,
        context: &EncryptionContext,
    ) -> Result<Binary, Error> {
        let value_type = value.value_type();
        if value_type != declaration.value_type {
            return Err(Error::TypeMismatch {
                path: declaration.path.clone(),
                expected: declaration.value_type,
                actual: value_type,
            });
        }

        let key = self.data_key(declaration.key_id)?;
        let plaintext = Zeroizing::new(value.to_cbor()?);

        let (nonce, mode) = match declaration.mode {
            EncryptionMode::Deterministic => (Vec::new(), EncryptionMode::Deterministic),
            mode => (RandomizedCipher::generate_nonce().to_vec(), mode),
        };
        let header = PayloadHeader::new(mode, declaration.key_id, value_type, nonce);
        let mut payload = header.to_bytes()?;
        let aad = associated_data(&payload, context);

        let ciphertext = match mode {
            EncryptionMode::Deterministic => key.deterministic.encrypt(&plaintext, &aad)?,
            _ => {
                let nonce: [u8; crate::randomized::NONCE_SIZE] = header
                    .nonce()
                    .try_into()
                    .map_err(|_| Error::EncryptionFailed("nonce size".to_string()))?;
                key.randomized.encrypt(&nonce, &plaintext, &aad)?
            }
        };

        payload.extend_from_slice(&ciphertext);
        Ok(Binary::new(Binary::ENCRYPTED, payload))
    }

    /// Decrypts an encrypted payload found at `context`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeader` for malformed payloads,
    /// `Error::KeyNotFound` if the key is gone, and
    /// `Error::AuthenticationFailed` if the payload was altered or moved to
    /// another field.
    pub fn decrypt_value(&self, payload: &Binary, context: &EncryptionContext) -> Result<Value, Error> {
        if !payload.is_encrypted() {
            return Err(Error::InvalidHeader(format!(
                "expected binary subtype 6, got {}",
                payload.subtype
            )));
        }
        let (header, header_len) = PayloadHeader::from_bytes(&payload.bytes)?;
        let key = self.data_key(header.key_id())?;
        let aad = associated_data(&payload.bytes[..header_len], context);
        let ciphertext = &payload.bytes[header_len..];

        let plaintext = Zeroizing::new(match header.mode() {
            EncryptionMode::Deterministic => key.deterministic.decrypt(ciphertext, &aad)?,
            _ => key.randomized.decrypt(header.nonce(), ciphertext, &aad)?,
        });

        let value = Value::from_cbor(&plaintext)?;
        if value.value_type() != header.value_type() {
            return Err(Error::Codec(format!(
                "payload declares {} but holds {}",
                header.value_type(),
                value.value_type()
            )));
        }
        Ok(value)
    }

    /// Equality tag of a value of a queryable field.
    ///
    /// # Errors
    ///
    /// Returns `Error::TypeMismatch` for a value of the wrong type, or a key
    /// resolution error.
    pub fn equality_tag(
        &self,
        value: &Value,
        declaration: &FieldDeclaration,
        context: &EncryptionContext,
    ) -> Result<Binary, Error> {
        if value.value_type() != declaration.value_type {
            return Err(Error::TypeMismatch {
                path: declaration.path.clone(),
                expected: declaration.value_type,
                actual: value.value_type(),
            });
        }
        let key = self.data_key(declaration.key_id)?;
        let tag = generate_equality_tag(&key.tag_key, &value.to_cbor()?, &IndexContext::from(context))?;
        Ok(Binary::new(Binary::GENERIC, tag))
    }

    fn data_key(&self, id: KeyId) -> Result<Arc<DataKey>, Error> {
        if let Some(key) = self.keys.lock().get(&id) {
            return Ok(Arc::clone(key));
        }

        let dek = self.vault.load_key(id)?;
        let key = Arc::new(DataKey::derive(&dek)?);
        self.keys.lock().insert(id, Arc::clone(&key));
        debug!(key_id = %id, "cached data key");
        Ok(key)
    }
}

fn associated_data(header: &[u8], context: &EncryptionContext) -> Vec<u8> {
    let context = context.to_string();
    let mut aad = Vec::with_capacity(header.len() + context.len());
    aad.extend_from_slice(header);
    aad.extend_from_slice(context.as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyProviderError;
    use crate::key_provider::KeyProvider;
    use crate::key_vault::DEFAULT_KEY_VAULT;
    use crate::store::MemoryStore;
    use crate::value::{utc_date, Document, ValueType};

    /// Stores DEKs unwrapped; enough for exercising the cipher.
    struct PlainProvider;

    impl KeyProvider for PlainProvider {
        fn provider_name(&self) -> &str {
            "local"
        }

        fn wrap_dek(&self, dek: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
            Ok(dek.to_vec())
        }

        fn unwrap_dek(&self, wrapped: &[u8]) -> Result<SecretVec<u8>, KeyProviderError> {
            Ok(SecretVec::new(wrapped.to_vec()))
        }
    }

    fn cipher() -> (FieldCipher, KeyId) {
        let vault = KeyVault::new(
            Arc::new(MemoryStore::new()),
            DEFAULT_KEY_VAULT.parse().unwrap(),
            Arc::new(PlainProvider),
        );
        let key = vault.create_data_key(&[]).unwrap();
        (FieldCipher::new(vault), key)
    }

    fn decl(path: &str, value_type: ValueType, mode: EncryptionMode, key_id: KeyId) -> FieldDeclaration {
        FieldDeclaration { path: path.to_string(), value_type, mode, key_id }
    }

    fn ctx(path: &str) -> EncryptionContext {
        EncryptionContext::new("CSFLE", "people", path)
    }

    #[test]
    fn test_deterministic_round_trip() {
        let (cipher, key) = cipher();
        let ssn = decl("ssn", ValueType::String, EncryptionMode::Deterministic, key);
        let value = Value::from("555-55-5555");

        let a = cipher.encrypt_value(&value, &ssn, &ctx("ssn")).unwrap();
        let b = cipher.encrypt_value(&value, &ssn, &ctx("ssn")).unwrap();
        assert!(a.is_encrypted());
        assert_eq!(a, b);
        assert_eq!(cipher.decrypt_value(&a, &ctx("ssn")).unwrap(), value);
    }

    #[test]
    fn test_random_round_trip() {
        let (cipher, key) = cipher();
        let object = decl("object_data", ValueType::Object, EncryptionMode::Random, key);
        let value = Value::from(Document::new().with("record", 1).with("num", 12_345_678));

        let a = cipher.encrypt_value(&value, &object, &ctx("object_data")).unwrap();
        let b = cipher.encrypt_value(&value, &object, &ctx("object_data")).unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt_value(&a, &ctx("object_data")).unwrap(), value);
        assert_eq!(cipher.decrypt_value(&b, &ctx("object_data")).unwrap(), value);
    }

    #[test]
    fn test_date_round_trip() {
        let (cipher, key) = cipher();
        let dob = decl("dob", ValueType::Date, EncryptionMode::Deterministic, key);
        let value = Value::from(utc_date(1989, 12, 13));

        let payload = cipher.encrypt_value(&value, &dob, &ctx("dob")).unwrap();
        assert_eq!(cipher.decrypt_value(&payload, &ctx("dob")).unwrap(), value);
    }

    #[test]
    fn test_type_mismatch() {
        let (cipher, key) = cipher();
        let dob = decl("dob", ValueType::Date, EncryptionMode::Deterministic, key);

        let err = cipher.encrypt_value(&Value::from("1989-12-13"), &dob, &ctx("dob")).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch { expected: ValueType::Date, actual: ValueType::String, .. }
        ));
    }

    #[test]
    fn test_payload_bound_to_field() {
        let (cipher, key) = cipher();
        let ssn = decl("ssn", ValueType::String, EncryptionMode::Deterministic, key);

        let payload = cipher.encrypt_value(&Value::from("555-55-5555"), &ssn, &ctx("ssn")).unwrap();
        let moved = cipher.decrypt_value(&payload, &ctx("contacts.mobile"));
        assert!(matches!(moved, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_missing_key() {
        let (cipher, _) = cipher();
        let ssn = decl("ssn", ValueType::String, EncryptionMode::Random, KeyId::new_v4());

        let err = cipher.encrypt_value(&Value::from("x"), &ssn, &ctx("ssn")).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_equality_tags() {
        let (cipher, key) = cipher();
        let ssn = decl("ssn", ValueType::String, EncryptionMode::Indexed, key);
        let qe = EncryptionContext::new("QE", "people", "ssn");

        let a = cipher.equality_tag(&Value::from("290-66-1234"), &ssn, &qe).unwrap();
        let b = cipher.equality_tag(&Value::from("290-66-1234"), &ssn, &qe).unwrap();
        let c = cipher.equality_tag(&Value::from("555-55-5555"), &ssn, &qe).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_encrypted());
    }

    #[test]
    fn test_rejects_plain_binary() {
        let (cipher, _) = cipher();
        let plain = Binary::new(Binary::GENERIC, vec![1, 2, 3]);
        assert!(matches!(cipher.decrypt_value(&plain, &ctx("ssn")), Err(Error::InvalidHeader(_))));
    }
}
