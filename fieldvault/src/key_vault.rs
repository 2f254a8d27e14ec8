//! Data encryption key vault.
//!
//! Each data encryption key (DEK) is a document in the key-vault collection:
//!
//! ```text
//! {
//!   _id: Binary(4, uuid), keyAltNames: ["ssn.people.CSFLE"],
//!   keyMaterial: Binary(0, wrapped DEK), creationDate, updateDate,
//!   status: 0, masterKey: {provider: "local"}
//! }
//! ```
//!
//! Alternate names are unique across the vault, enforced by a unique index
//! on `keyAltNames` that only covers documents carrying the field.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretVec};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, KeyProviderError};
use crate::kdf::{generate_dek, DEK_SIZE};
use crate::key_provider::KeyProvider;
use crate::namespace::Namespace;
use crate::store::{DocumentStore, Filter, IndexModel, Update};
use crate::value::{Binary, Document, Value};

/// Default key-vault namespace.
pub const DEFAULT_KEY_VAULT: &str = "encryption.__keyVault";

/// Identifier of a data encryption key (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(Uuid);

impl KeyId {
    /// Generates a random key id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds a key id from its 16 raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The id as a UUID binary value (subtype 4).
    #[must_use]
    pub fn to_value(self) -> Value {
        Value::Binary(Binary::new(Binary::UUID, self.as_bytes().to_vec()))
    }

    /// Reads a key id from a UUID binary value.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the value is not a 16-byte UUID binary.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Binary(Binary { subtype: Binary::UUID, bytes }) => {
                let bytes: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    Error::InvalidDocument(format!("UUID must be 16 bytes, got {}", bytes.len()))
                })?;
                Ok(Self::from_bytes(bytes))
            }
            other => Err(Error::InvalidDocument(format!("expected a UUID key id, got {other}"))),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for KeyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidDocument(format!("invalid key id '{s}': {e}")))
    }
}

/// A key-vault document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKeyRecord {
    /// Key identifier
    pub id: KeyId,
    /// Unique alternate names
    pub alt_names: Vec<String>,
    /// DEK wrapped by the key provider
    pub key_material: Vec<u8>,
    /// Creation time
    pub creation_date: DateTime<Utc>,
    /// Last update time
    pub update_date: DateTime<Utc>,
    /// Key status; 0 is active
    pub status: i64,
    /// Master key descriptor, at least `{provider: <name>}`
    pub master_key: Document,
}

impl DataKeyRecord {
    /// Provider that wrapped the key material.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.master_key.get_str("provider")
    }

    /// Renders the record as a key-vault document.
    ///
    /// `keyAltNames` is omitted when empty so the record stays outside the
    /// partial unique index.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new().with("_id", self.id.to_value());
        if !self.alt_names.is_empty() {
            doc.insert(
                "keyAltNames",
                self.alt_names.iter().map(|n| Value::from(n.as_str())).collect::<Vec<_>>(),
            );
        }
        doc.with("keyMaterial", Binary::new(Binary::GENERIC, self.key_material.clone()))
            .with("creationDate", self.creation_date)
            .with("updateDate", self.update_date)
            .with("status", self.status)
            .with("masterKey", self.master_key.clone())
    }

    /// Parses a key-vault document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if a required field is missing or
    /// has the wrong type.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let missing = |field: &str| Error::InvalidDocument(format!("key document missing '{field}'"));

        let id = KeyId::from_value(document.get("_id").ok_or_else(|| missing("_id"))?)?;
        let alt_names = document
            .get_array("keyAltNames")
            .unwrap_or_default()
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| missing("keyAltNames")))
            .collect::<Result<Vec<_>, _>>()?;
        let key_material = document
            .get("keyMaterial")
            .and_then(Value::as_binary)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| missing("keyMaterial"))?;
        let creation_date = *document
            .get("creationDate")
            .and_then(Value::as_datetime)
            .ok_or_else(|| missing("creationDate"))?;
        let update_date = document
            .get("updateDate")
            .and_then(Value::as_datetime)
            .copied()
            .unwrap_or(creation_date);
        let status = document.get("status").and_then(Value::as_i64).unwrap_or(0);
        let master_key =
            document.get_document("masterKey").cloned().ok_or_else(|| missing("masterKey"))?;

        Ok(Self { id, alt_names, key_material, creation_date, update_date, status, master_key })
    }
}

/// Alternate name of the key protecting `field`: `{field}.{collection}.{database}`.
#[must_use]
pub fn alt_name(field: &str, collection: &str, database: &str) -> String {
    format!("{field}.{collection}.{database}")
}

/// Pattern matching every alternate name scoped to `collection` in `database`.
#[must_use]
pub fn reset_pattern(collection: &str, database: &str) -> String {
    format!(r"\.{}\.{}", regex::escape(collection), regex::escape(database))
}

/// The key-vault collection, and the only writer to it.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn DocumentStore>,
    namespace: Namespace,
    provider: Arc<dyn KeyProvider>,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("namespace", &self.namespace)
            .field("provider", &self.provider.provider_name())
            .finish_non_exhaustive()
    }
}

impl KeyVault {
    /// Creates a key vault over `namespace` in `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        namespace: Namespace,
        provider: Arc<dyn KeyProvider>,
    ) -> Self {
        Self { store, namespace, provider }
    }

    /// Key-vault namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Key provider wrapping this vault's keys.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn KeyProvider> {
        &self.provider
    }

    /// Deletes every key with an alternate name matching `pattern`.
    ///
    /// Returns the number of keys deleted.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the pattern is not a valid regex.
    pub fn delete_keys_matching(&self, pattern: &str) -> Result<u64, Error> {
        let deleted = self.store.delete_many(&self.namespace, &Filter::regex("keyAltNames", pattern)?)?;
        debug!(pattern, deleted, "deleted data keys");
        Ok(deleted)
    }

    /// Creates the unique partial index on `keyAltNames`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if existing keys already share a name.
    pub fn ensure_alt_name_index(&self) -> Result<String, Error> {
        let index = IndexModel::new(["keyAltNames"])
            .unique(true)
            .partial_filter(Filter::exists("keyAltNames", true));
        self.store.create_index(&self.namespace, index)
    }

    /// Generates, wraps and stores a new DEK.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if an alternate name is already taken,
    /// or a key-provider error if wrapping fails.
    pub fn create_data_key(&self, alt_names: &[String]) -> Result<KeyId, Error> {
        let dek = generate_dek();
        let key_material = self.provider.wrap_dek(dek.expose_secret())?;
        let now = Utc::now();
        let record = DataKeyRecord {
            id: KeyId::new_v4(),
            alt_names: alt_names.to_vec(),
            key_material,
            creation_date: now,
            update_date: now,
            status: 0,
            master_key: self.provider.master_key(),
        };

        self.store.insert_one(&self.namespace, record.to_document())?;
        debug!(key_id = %record.id, ?alt_names, "created data key");
        Ok(record.id)
    }

    /// Looks up a key by alternate name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the document is malformed.
    pub fn find_by_alt_name(&self, name: &str) -> Result<Option<DataKeyRecord>, Error> {
        self.find_one(&Filter::eq("keyAltNames", name))
    }

    /// Resolves an alternate name to its key id.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyAltNameNotFound` if no key carries the name.
    pub fn key_id_for_alt_name(&self, name: &str) -> Result<KeyId, Error> {
        self.find_by_alt_name(name)?
            .map(|record| record.id)
            .ok_or_else(|| Error::KeyAltNameNotFound(name.to_string()))
    }

    /// Looks up a key by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the document is malformed.
    pub fn get_key(&self, id: KeyId) -> Result<Option<DataKeyRecord>, Error> {
        self.find_one(&Filter::eq("_id", id.to_value()))
    }

    /// Adds an alternate name to a key (`$addToSet`) and bumps `updateDate`.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyNotFound` if the key does not exist and
    /// `Error::DuplicateKey` if another key already uses the name.
    pub fn add_key_alt_name(&self, id: KeyId, name: &str) -> Result<DataKeyRecord, Error> {
        let update = Update::new().add_to_set("keyAltNames", name).current_date("updateDate");
        let filter = Filter::eq("_id", id.to_value());
        if self.store.update_one(&self.namespace, &filter, &update)? == 0 {
            return Err(Error::KeyNotFound(id.to_string()));
        }
        debug!(key_id = %id, name, "added key alternate name");
        self.get_key(id)?.ok_or_else(|| Error::KeyNotFound(id.to_string()))
    }

    /// Unwraps the DEK of a record.
    ///
    /// # Errors
    ///
    /// Returns a key-provider error if the record was wrapped by another
    /// provider or does not authenticate.
    pub fn unwrap_key(&self, record: &DataKeyRecord) -> Result<SecretVec<u8>, Error> {
        let expected = self.provider.provider_name();
        if let Some(actual) = record.provider().filter(|actual| *actual != expected) {
            return Err(KeyProviderError::ProviderMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        let dek = self.provider.unwrap_dek(&record.key_material)?;
        if dek.expose_secret().len() != DEK_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: DEK_SIZE,
                actual: dek.expose_secret().len(),
            });
        }
        debug!(key_id = %record.id, "unwrapped data key");
        Ok(dek)
    }

    /// Fetches and unwraps a DEK by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyNotFound` if the key does not exist.
    pub fn load_key(&self, id: KeyId) -> Result<SecretVec<u8>, Error> {
        let record = self.get_key(id)?.ok_or_else(|| Error::KeyNotFound(id.to_string()))?;
        self.unwrap_key(&record)
    }

    /// Resets and provisions the vault: deletes keys matching
    /// `reset_pattern`, ensures the alternate-name index, then creates one
    /// key per name, in that order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step.
    pub fn bootstrap(&self, alt_names: &[String], reset_pattern: &str) -> Result<Vec<KeyId>, Error> {
        self.delete_keys_matching(reset_pattern)?;
        self.ensure_alt_name_index()?;
        alt_names.iter().map(|name| self.create_data_key(std::slice::from_ref(name))).collect()
    }

    fn find_one(&self, filter: &Filter) -> Result<Option<DataKeyRecord>, Error> {
        self.store
            .find(&self.namespace, filter)?
            .first()
            .map(DataKeyRecord::from_document)
            .transpose()
    }
}
