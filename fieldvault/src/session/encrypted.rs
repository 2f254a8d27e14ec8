//! Encryption-aware sessions.
//!
//! An [`EncryptedClient`] encrypts declared fields on write, rewrites
//! equality filters on encrypted fields, and decrypts every encrypted payload
//! it reads back. Field declarations for a collection are taken from, in
//! order: the CSFLE schema map, the queryable-encryption field map, and the
//! `encryptedFields` the collection was created with.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::plain::Client;
use crate::algorithm::EncryptionMode;
use crate::cipher::FieldCipher;
use crate::context::EncryptionContext;
use crate::error::Error;
use crate::key_provider::KeyProvider;
use crate::key_vault::{DataKeyRecord, KeyId, KeyVault};
use crate::namespace::Namespace;
use crate::schema::{EncryptedFields, FieldMap, PathMatch, SchemaMap};
use crate::store::{CollectionOptions, DocumentStore, Filter};
use crate::value::{Document, Value};

/// Field holding the equality tags of a queryable-encryption document.
pub const SAFE_CONTENT: &str = "__safeContent__";

/// Encryption configuration of a session.
#[derive(Clone)]
pub struct AutoEncryptionOptions {
    /// Where data keys live
    pub key_vault_namespace: Namespace,
    /// Master-key provider
    pub key_provider: Arc<dyn KeyProvider>,
    /// CSFLE schemas
    pub schema_map: SchemaMap,
    /// Queryable-encryption field lists supplied by the client
    pub encrypted_fields_map: BTreeMap<Namespace, EncryptedFields>,
    /// Query-analysis shared library; must exist when set
    pub crypt_shared_lib_path: Option<PathBuf>,
    /// Skip automatic encryption of writes and filters; reads are still
    /// decrypted
    pub bypass_query_analysis: bool,
}

impl fmt::Debug for AutoEncryptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoEncryptionOptions")
            .field("key_vault_namespace", &self.key_vault_namespace)
            .field("key_provider", &self.key_provider.provider_name())
            .field("schema_map", &self.schema_map)
            .field("encrypted_fields_map", &self.encrypted_fields_map)
            .field("crypt_shared_lib_path", &self.crypt_shared_lib_path)
            .field("bypass_query_analysis", &self.bypass_query_analysis)
            .finish()
    }
}

impl AutoEncryptionOptions {
    /// Options with a key vault and provider and no declarations.
    #[must_use]
    pub fn new(key_vault_namespace: Namespace, key_provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            key_vault_namespace,
            key_provider,
            schema_map: SchemaMap::new(),
            encrypted_fields_map: BTreeMap::new(),
            crypt_shared_lib_path: None,
            bypass_query_analysis: false,
        }
    }

    /// Sets the CSFLE schema map.
    #[must_use]
    pub fn with_schema_map(mut self, schema_map: SchemaMap) -> Self {
        self.schema_map = schema_map;
        self
    }

    /// Adds a queryable-encryption field list.
    #[must_use]
    pub fn with_encrypted_fields(mut self, namespace: Namespace, fields: EncryptedFields) -> Self {
        self.encrypted_fields_map.insert(namespace, fields);
        self
    }

    /// Sets the query-analysis library path.
    #[must_use]
    pub fn with_crypt_shared_lib_path(mut self, path: Option<PathBuf>) -> Self {
        self.crypt_shared_lib_path = path;
        self
    }

    /// Disables automatic encryption.
    #[must_use]
    pub const fn bypass_query_analysis(mut self, bypass: bool) -> Self {
        self.bypass_query_analysis = bypass;
        self
    }
}

struct Inner {
    cipher: FieldCipher,
    options: AutoEncryptionOptions,
}

/// A connection that encrypts and decrypts declared fields.
#[derive(Clone)]
pub struct EncryptedClient {
    client: Client,
    inner: Arc<Inner>,
}

impl fmt::Debug for EncryptedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedClient")
            .field("client", &self.client)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl EncryptedClient {
    /// Connects with automatic encryption.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryAnalysisUnavailable` if a configured library path
    /// does not exist, `Error::InvalidDeclaration` if a schema is invalid,
    /// or a connection error.
    pub fn connect(uri: &str, options: AutoEncryptionOptions) -> Result<Self, Error> {
        if let Some(path) = &options.crypt_shared_lib_path {
            if !path.exists() {
                return Err(Error::QueryAnalysisUnavailable(path.clone()));
            }
        }
        let client = Client::connect(uri)?;
        Self::with_client(client, options)
    }

    /// Adds automatic encryption to an existing client.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if a schema or field list is
    /// invalid, or if a namespace appears in both maps.
    pub fn with_client(client: Client, options: AutoEncryptionOptions) -> Result<Self, Error> {
        for (namespace, schema) in options.schema_map.iter() {
            FieldMap::from_schema(schema)
                .inspect_err(|err| debug!(%namespace, %err, "rejected schema map entry"))?;
        }
        for (namespace, fields) in &options.encrypted_fields_map {
            if options.schema_map.get(namespace).is_some() {
                return Err(Error::InvalidDeclaration(format!(
                    "{namespace} is declared in both the schema map and the encrypted fields map"
                )));
            }
            FieldMap::from_encrypted_fields(fields)
                .inspect_err(|err| debug!(%namespace, %err, "rejected encrypted fields entry"))?;
        }

        let vault = KeyVault::new(
            Arc::clone(client.store()?),
            options.key_vault_namespace.clone(),
            Arc::clone(&options.key_provider),
        );
        debug!(
            uri = client.uri(),
            key_vault = %options.key_vault_namespace,
            bypass = options.bypass_query_analysis,
            "opened encrypted client"
        );
        Ok(Self { client, inner: Arc::new(Inner { cipher: FieldCipher::new(vault), options }) })
    }

    /// Handle to a database.
    #[must_use]
    pub fn database(&self, name: &str) -> EncryptedDatabase {
        EncryptedDatabase { client: self.clone(), name: name.to_string() }
    }

    /// Key-management helper sharing this client's key vault.
    #[must_use]
    pub fn client_encryption(&self) -> ClientEncryption {
        ClientEncryption { vault: self.inner.cipher.key_vault().clone() }
    }

    /// Encryption options.
    #[must_use]
    pub fn options(&self) -> &AutoEncryptionOptions {
        &self.inner.options
    }

    /// Closes the client.
    pub fn close(&self) {
        self.client.close();
    }

    /// Whether the client is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn store(&self) -> Result<&Arc<dyn DocumentStore>, Error> {
        self.client.store()
    }

    /// Encrypted fields of a collection.
    fn field_map(&self, namespace: &Namespace) -> Result<FieldMap, Error> {
        let options = &self.inner.options;
        if let Some(schema) = options.schema_map.get(namespace) {
            return FieldMap::from_schema(schema);
        }
        if let Some(fields) = options.encrypted_fields_map.get(namespace) {
            return FieldMap::from_encrypted_fields(fields);
        }
        let server_side = self
            .store()?
            .collection_options(namespace)?
            .and_then(|o| o.encrypted_fields);
        match server_side {
            Some(doc) => FieldMap::from_encrypted_fields(&EncryptedFields::from_document(&doc)?),
            None => Ok(FieldMap::default()),
        }
    }
}

/// Database handle of an encrypted client.
#[derive(Debug, Clone)]
pub struct EncryptedDatabase {
    client: EncryptedClient,
    name: String,
}

impl EncryptedDatabase {
    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to a collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` for an empty name.
    pub fn collection(&self, name: &str) -> Result<EncryptedCollection, Error> {
        Ok(EncryptedCollection {
            client: self.client.clone(),
            namespace: Namespace::new(&self.name, name)?,
        })
    }

    /// Installs a validator on an existing collection (`collMod`).
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceNotFound` if the collection does not exist.
    pub fn run_coll_mod(&self, collection: &str, validator: Document) -> Result<(), Error> {
        let namespace = Namespace::new(&self.name, collection)?;
        self.client.store()?.set_validator(&namespace, validator)
    }

    /// Drops the database.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` if the client is closed.
    pub fn drop(&self) -> Result<(), Error> {
        self.client.store()?.drop_database(&self.name)
    }
}

/// Collection handle of an encrypted client.
#[derive(Debug, Clone)]
pub struct EncryptedCollection {
    client: EncryptedClient,
    namespace: Namespace,
}

impl EncryptedCollection {
    /// Collection namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Encrypts declared fields and inserts the document.
    ///
    /// Queryable fields also add an equality tag to `__safeContent__`.
    ///
    /// # Errors
    ///
    /// Returns an encryption error (type mismatch, missing key) or a store
    /// error. Nothing is written on failure.
    pub fn insert_one(&self, mut document: Document) -> Result<Value, Error> {
        if document.contains_key(SAFE_CONTENT) {
            return Err(Error::InvalidDocument(format!("{SAFE_CONTENT} is reserved")));
        }
        if !self.client.inner.options.bypass_query_analysis {
            self.encrypt_document(&mut document)?;
        }
        self.client.store()?.insert_one(&self.namespace, document)
    }

    /// Returns decrypted documents matching a query document.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryNotSupported` if the filter needs a comparison
    /// the field's encryption cannot answer.
    pub fn find(&self, filter: &Document) -> Result<Vec<Document>, Error> {
        let filter = self.rewrite_filter(filter)?;
        let mut documents = self.client.store()?.find(&self.namespace, &filter)?;
        for document in &mut documents {
            self.decrypt_document(document, "")?;
        }
        Ok(documents)
    }

    /// Returns the first decrypted match.
    ///
    /// # Errors
    ///
    /// See [`EncryptedCollection::find`].
    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, Error> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Deletes every match.
    ///
    /// # Errors
    ///
    /// See [`EncryptedCollection::find`].
    pub fn delete_many(&self, filter: &Document) -> Result<u64, Error> {
        let filter = self.rewrite_filter(filter)?;
        self.client.store()?.delete_many(&self.namespace, &filter)
    }

    /// Drops the collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` if the client is closed.
    pub fn drop(&self) -> Result<bool, Error> {
        self.client.store()?.drop_collection(&self.namespace)
    }

    fn context(&self, path: &str) -> EncryptionContext {
        EncryptionContext::for_field(&self.namespace, path)
    }

    fn encrypt_document(&self, document: &mut Document) -> Result<(), Error> {
        let fields = self.client.field_map(&self.namespace)?;
        let cipher = &self.client.inner.cipher;
        let mut tags = Vec::new();

        for declaration in fields.iter() {
            let Some(value) = document.get_path_mut(&declaration.path) else {
                continue;
            };
            let context = self.context(&declaration.path);
            if declaration.mode == EncryptionMode::Indexed {
                tags.push(Value::Binary(cipher.equality_tag(value, declaration, &context)?));
            }
            *value = Value::Binary(cipher.encrypt_value(value, declaration, &context)?);
            debug!(namespace = %self.namespace, path = %declaration.path, mode = %declaration.mode, "encrypted field");
        }

        if fields.is_queryable_encryption() {
            document.insert(SAFE_CONTENT, tags);
        }
        Ok(())
    }

    fn decrypt_document(&self, document: &mut Document, prefix: &str) -> Result<(), Error> {
        for (key, value) in document.iter_mut() {
            let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            self.decrypt_value(value, &path)?;
        }
        Ok(())
    }

    fn decrypt_value(&self, value: &mut Value, path: &str) -> Result<(), Error> {
        match value {
            Value::Binary(payload) if payload.is_encrypted() => {
                let plain = self.client.inner.cipher.decrypt_value(payload, &self.context(path))?;
                *value = plain;
            }
            Value::Document(inner) => self.decrypt_document(inner, path)?,
            Value::Array(items) => {
                for item in items {
                    self.decrypt_value(item, path)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn rewrite_filter(&self, filter: &Document) -> Result<Filter, Error> {
        let filter = Filter::from_document(filter)?;
        if self.client.inner.options.bypass_query_analysis {
            return Ok(filter);
        }
        let fields = self.client.field_map(&self.namespace)?;
        if fields.is_empty() {
            return Ok(filter);
        }
        let rewritten = self.rewrite(filter, &fields)?;
        debug!(namespace = %self.namespace, filter = %rewritten.to_document(), "rewrote filter");
        Ok(rewritten)
    }

    fn rewrite(&self, filter: Filter, fields: &FieldMap) -> Result<Filter, Error> {
        let unsupported = |path: &str, reason: String| Error::QueryNotSupported {
            path: path.to_string(),
            reason,
        };

        match filter {
            Filter::All => Ok(Filter::All),
            Filter::And(filters) => Ok(Filter::And(
                filters.into_iter().map(|f| self.rewrite(f, fields)).collect::<Result<_, _>>()?,
            )),
            Filter::Eq { path, value } => match fields.lookup(&path) {
                PathMatch::Plain => Ok(Filter::Eq { path, value }),
                PathMatch::Declared(decl) => {
                    let cipher = &self.client.inner.cipher;
                    let context = self.context(&path);
                    match decl.mode {
                        EncryptionMode::Deterministic => {
                            let payload = cipher.encrypt_value(&value, decl, &context)?;
                            Ok(Filter::Eq { path, value: Value::Binary(payload) })
                        }
                        EncryptionMode::Indexed => {
                            let tag = cipher.equality_tag(&value, decl, &context)?;
                            Ok(Filter::eq(SAFE_CONTENT, tag))
                        }
                        EncryptionMode::Random => Err(unsupported(
                            &path,
                            "field is encrypted with the random algorithm".to_string(),
                        )),
                        EncryptionMode::Unindexed => Err(unsupported(
                            &path,
                            "field is encrypted without equality queries".to_string(),
                        )),
                    }
                }
                PathMatch::Inside(decl) => Err(unsupported(
                    &path,
                    format!("'{}' is encrypted as a whole", decl.path),
                )),
                PathMatch::Ancestor(decl) => Err(unsupported(
                    &path,
                    format!("value contains encrypted field '{}'", decl.path),
                )),
            },
            Filter::Exists { path, exists } => match fields.lookup(&path) {
                PathMatch::Inside(decl) => Err(unsupported(
                    &path,
                    format!("'{}' is encrypted as a whole", decl.path),
                )),
                _ => Ok(Filter::Exists { path, exists }),
            },
            Filter::Regex { path, pattern } => match fields.lookup(&path) {
                PathMatch::Declared(_) | PathMatch::Inside(_) => Err(unsupported(
                    &path,
                    "pattern matching is not supported on encrypted fields".to_string(),
                )),
                _ => Ok(Filter::Regex { path, pattern }),
            },
        }
    }
}

/// Explicit key management against a key vault.
#[derive(Debug, Clone)]
pub struct ClientEncryption {
    vault: KeyVault,
}

impl ClientEncryption {
    /// Key management over `key_vault_namespace` in the client's store.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` if the client is closed.
    pub fn new(
        client: &Client,
        key_vault_namespace: Namespace,
        provider: Arc<dyn KeyProvider>,
    ) -> Result<Self, Error> {
        Ok(Self { vault: KeyVault::new(Arc::clone(client.store()?), key_vault_namespace, provider) })
    }

    /// The key vault.
    #[must_use]
    pub const fn key_vault(&self) -> &KeyVault {
        &self.vault
    }

    /// Creates a data key.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if an alternate name is taken.
    pub fn create_data_key(&self, alt_names: &[String]) -> Result<KeyId, Error> {
        self.vault.create_data_key(alt_names)
    }

    /// Adds an alternate name to a key.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyNotFound` if the key does not exist.
    pub fn add_key_alt_name(&self, id: KeyId, name: &str) -> Result<DataKeyRecord, Error> {
        self.vault.add_key_alt_name(id, name)
    }

    /// Looks up a key by alternate name.
    ///
    /// # Errors
    ///
    /// Returns an error if the key vault cannot be read.
    pub fn get_key_by_alt_name(&self, name: &str) -> Result<Option<DataKeyRecord>, Error> {
        self.vault.find_by_alt_name(name)
    }

    /// Creates a queryable-encryption collection.
    ///
    /// Every field without a `keyId` gets a new data key. The collection is
    /// created with the completed `encryptedFields`, which also provisions
    /// its auxiliary collections.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` for an invalid field list (before
    /// any key is created), `Error::NamespaceExists` if the collection exists.
    pub fn create_encrypted_collection(
        &self,
        database: &EncryptedDatabase,
        name: &str,
        mut fields: EncryptedFields,
    ) -> Result<(EncryptedCollection, EncryptedFields), Error> {
        let collection = database.collection(name)?;

        // Validate with placeholder keys first so a bad list creates no keys
        let mut probe = fields.clone();
        for field in probe.fields.iter_mut().filter(|f| f.key_id.is_none()) {
            field.key_id = Some(KeyId::new_v4());
        }
        FieldMap::from_encrypted_fields(&probe)?;

        for field in fields.fields.iter_mut().filter(|f| f.key_id.is_none()) {
            let key_id = self.vault.create_data_key(&[])?;
            debug!(path = %field.path, %key_id, "created data key for encrypted field");
            field.key_id = Some(key_id);
        }

        database.client.store()?.create_collection(
            collection.namespace(),
            CollectionOptions::encrypted(fields.to_document()),
        )?;
        Ok((collection, fields))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretVec;

    use super::*;
    use crate::algorithm::QueryType;
    use crate::error::KeyProviderError;
    use crate::key_vault::DEFAULT_KEY_VAULT;
    use crate::schema::{EncryptSpec, EncryptedField, JsonSchema};
    use crate::value::ValueType;

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

    fn uri() -> String {
        format!("memory://encrypted-{}", uuid::Uuid::new_v4())
    }

    fn options() -> AutoEncryptionOptions {
        AutoEncryptionOptions::new(DEFAULT_KEY_VAULT.parse().unwrap(), Arc::new(PlainProvider))
    }

    fn csfle_client(uri: &str) -> EncryptedClient {
        let bootstrap = EncryptedClient::connect(uri, options()).unwrap();
        let keys = bootstrap.client_encryption();
        let ssn = keys.create_data_key(&[]).unwrap();
        let mobile = keys.create_data_key(&[]).unwrap();

        let schema = JsonSchema::object()
            .encrypt("ssn", EncryptSpec::deterministic(ValueType::String, ssn))
            .property(
                "contacts",
                JsonSchema::object().encrypt("mobile", EncryptSpec::random(ValueType::String, mobile)),
            );
        let map = SchemaMap::new().with("CSFLE.people".parse().unwrap(), schema);
        EncryptedClient::connect(uri, options().with_schema_map(map)).unwrap()
    }

    fn person(name: &str, ssn: &str) -> Document {
        Document::new()
            .with("name", name)
            .with("ssn", ssn)
            .with("contacts", Document::new().with("mobile", "212-867-5309").with("city", "New York"))
    }

    #[test]
    fn test_csfle_write_and_read() {
        let uri = uri();
        let client = csfle_client(&uri);
        let people = client.database("CSFLE").collection("people").unwrap();
        people.insert_one(person("Taylor", "555-55-5555")).unwrap();
        people.insert_one(person("Thomas", "290-66-1234")).unwrap();

        let thomas = people.find_one(&Document::new().with("ssn", "290-66-1234")).unwrap().unwrap();
        assert_eq!(thomas.get_str("name"), Some("Thomas"));
        assert_eq!(thomas.get_path("contacts.mobile"), Some(&Value::from("212-867-5309")));

        let raw = Client::connect(&uri).unwrap();
        let stored = raw
            .database("CSFLE")
            .collection("people")
            .unwrap()
            .find_one(&Document::new().with("name", "Thomas"))
            .unwrap()
            .unwrap();
        assert!(stored.get("ssn").is_some_and(Value::is_encrypted));
        assert!(stored.get_path("contacts.mobile").is_some_and(Value::is_encrypted));
        assert_eq!(stored.get_path("contacts.city"), Some(&Value::from("New York")));
        assert!(!stored.contains_key(SAFE_CONTENT));
    }

    #[test]
    fn test_random_field_not_queryable() {
        let client = csfle_client(&uri());
        let people = client.database("CSFLE").collection("people").unwrap();

        let by_mobile = Document::new().with("contacts.mobile", "212-867-5309");
        assert!(matches!(people.find(&by_mobile), Err(Error::QueryNotSupported { .. })));

        let by_contacts = Document::new().with("contacts", Document::new());
        assert!(matches!(people.find(&by_contacts), Err(Error::QueryNotSupported { .. })));

        let regex = Document::new().with("ssn", Document::new().with("$regex", "^555"));
        assert!(matches!(people.find(&regex), Err(Error::QueryNotSupported { .. })));
    }

    #[test]
    fn test_type_mismatch_rejects_document() {
        let client = csfle_client(&uri());
        let people = client.database("CSFLE").collection("people").unwrap();

        let bad = Document::new().with("name", "Bad").with("ssn", 5_555_555);
        assert!(matches!(people.insert_one(bad), Err(Error::TypeMismatch { .. })));
        assert!(people.find(&Document::new()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_crypt_shared_library() {
        let options = options().with_crypt_shared_lib_path(Some("/nonexistent/mongo_crypt_v1.so".into()));
        let err = EncryptedClient::connect(&uri(), options).unwrap_err();
        assert!(matches!(err, Error::QueryAnalysisUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_declaration_rejected_at_connect() {
        let schema = JsonSchema::object()
            .encrypt("object_data", EncryptSpec::deterministic(ValueType::Object, KeyId::new_v4()));
        let map = SchemaMap::new().with("CSFLE.people".parse().unwrap(), schema);
        let err = EncryptedClient::connect(&uri(), options().with_schema_map(map)).unwrap_err();
        assert!(matches!(err, Error::InvalidDeclaration(_)));

        let keyless = EncryptedFields::new().field(EncryptedField::new("ssn", ValueType::String));
        let options = options().with_encrypted_fields("QE.people".parse().unwrap(), keyless);
        let err = EncryptedClient::connect(&uri(), options).unwrap_err();
        assert!(matches!(err, Error::InvalidDeclaration(_)));
    }

    #[test]
    fn test_queryable_encryption_collection() {
        let uri = uri();
        let client = EncryptedClient::connect(&uri, options()).unwrap();
        let db = client.database("QE");
        let fields = EncryptedFields::new()
            .field(EncryptedField::new("ssn", ValueType::String).queryable(QueryType::Equality))
            .field(EncryptedField::new("object_data", ValueType::Object));

        let (people, completed) =
            client.client_encryption().create_encrypted_collection(&db, "people", fields).unwrap();
        assert!(completed.fields.iter().all(|f| f.key_id.is_some()));

        people
            .insert_one(
                Document::new()
                    .with("name", "Thomas")
                    .with("ssn", "290-66-1234")
                    .with("object_data", Document::new().with("record", 1)),
            )
            .unwrap();

        let found = people.find_one(&Document::new().with("ssn", "290-66-1234")).unwrap().unwrap();
        assert_eq!(found.get_str("name"), Some("Thomas"));
        assert!(people.find_one(&Document::new().with("ssn", "555-55-5555")).unwrap().is_none());

        let object_query = Document::new().with("object_data", Document::new().with("record", 1));
        assert!(matches!(people.find(&object_query), Err(Error::QueryNotSupported { .. })));

        let raw = Client::connect(&uri).unwrap().database("QE");
        let stored = raw.collection("people").unwrap().find_one(&Document::new()).unwrap().unwrap();
        assert_eq!(stored.get_array(SAFE_CONTENT).map(<[Value]>::len), Some(1));
        assert!(raw.list_collection_names().unwrap().contains(&"enxcol_.people.esc".to_string()));
    }

    #[test]
    fn test_safe_content_is_reserved() {
        let client = csfle_client(&uri());
        let people = client.database("CSFLE").collection("people").unwrap();
        let doc = Document::new().with(SAFE_CONTENT, Vec::<Value>::new());
        assert!(matches!(people.insert_one(doc), Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_invalid_field_list_creates_no_keys() {
        let client = EncryptedClient::connect(&uri(), options()).unwrap();
        let encryption = client.client_encryption();
        let fields = EncryptedFields::new()
            .field(EncryptedField::new("array_data", ValueType::Array).queryable(QueryType::Equality));

        let result = encryption.create_encrypted_collection(&client.database("QE"), "people", fields);
        assert!(matches!(result, Err(Error::InvalidDeclaration(_))));

        let vault = encryption.key_vault();
        let store = client.store().unwrap();
        assert!(store.find(vault.namespace(), &Filter::All).unwrap().is_empty());
    }
}
