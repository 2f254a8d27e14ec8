//! Sessions without encryption configuration.
//!
//! Encrypted fields written by an encrypted session surface here as binary
//! subtype 6 values.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::namespace::Namespace;
use crate::store::{self, CollectionOptions, DocumentStore, Filter, IndexModel, Update};
use crate::value::{Document, Value};

/// A connection to a document store.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn DocumentStore>,
    uri: String,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("uri", &self.uri)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connects to the store named by `uri`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConnectionString` or `Error::UnsupportedScheme`.
    pub fn connect(uri: &str) -> Result<Self, Error> {
        let store = store::connect(uri)?;
        debug!(uri, "connected");
        Ok(Self::with_store(store, uri))
    }

    /// Wraps an already opened store.
    #[must_use]
    pub fn with_store(store: Arc<dyn DocumentStore>, uri: impl Into<String>) -> Self {
        Self { store, uri: uri.into(), closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Connection string this client was opened with.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Handle to a database.
    #[must_use]
    pub fn database(&self, name: &str) -> Database {
        Database { client: self.clone(), name: name.to_string() }
    }

    /// The underlying store, unless the client is closed.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` after [`Client::close`].
    pub fn store(&self) -> Result<&Arc<dyn DocumentStore>, Error> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        Ok(&self.store)
    }

    /// Closes the client and every handle derived from it.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(uri = %self.uri, "closed client");
        }
    }

    /// Whether [`Client::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle to a database.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to a collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` for an empty collection name.
    pub fn collection(&self, name: &str) -> Result<Collection, Error> {
        Ok(Collection { client: self.client.clone(), namespace: Namespace::new(&self.name, name)? })
    }

    /// Creates a collection explicitly.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceExists` if the collection exists.
    pub fn create_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> Result<Collection, Error> {
        let collection = self.collection(name)?;
        self.client.store()?.create_collection(&collection.namespace, options)?;
        Ok(collection)
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

    /// Names of the collections in this database.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` if the client is closed.
    pub fn list_collection_names(&self) -> Result<Vec<String>, Error> {
        self.client.store()?.list_collections(&self.name)
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

/// Handle to a collection.
#[derive(Debug, Clone)]
pub struct Collection {
    client: Client,
    namespace: Namespace,
}

impl Collection {
    /// Collection namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Inserts a document and returns its `_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` or `Error::DocumentValidation` when the
    /// store rejects the document.
    pub fn insert_one(&self, document: Document) -> Result<Value, Error> {
        self.client.store()?.insert_one(&self.namespace, document)
    }

    /// Returns the documents matching a query document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for an unsupported query.
    pub fn find(&self, filter: &Document) -> Result<Vec<Document>, Error> {
        self.client.store()?.find(&self.namespace, &Filter::from_document(filter)?)
    }

    /// Returns the first document matching a query document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for an unsupported query.
    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, Error> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Applies an update document to the first match.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for unsupported operators.
    pub fn update_one(&self, filter: &Document, update: &Document) -> Result<u64, Error> {
        self.client.store()?.update_one(
            &self.namespace,
            &Filter::from_document(filter)?,
            &Update::from_document(update)?,
        )
    }

    /// Deletes every match.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for an unsupported query.
    pub fn delete_many(&self, filter: &Document) -> Result<u64, Error> {
        self.client.store()?.delete_many(&self.namespace, &Filter::from_document(filter)?)
    }

    /// Creates an index.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if existing documents violate it.
    pub fn create_index(&self, index: IndexModel) -> Result<String, Error> {
        self.client.store()?.create_index(&self.namespace, index)
    }

    /// Drops the collection. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` if the client is closed.
    pub fn drop(&self) -> Result<bool, Error> {
        self.client.store()?.drop_collection(&self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::connect(&format!("memory://plain-{}", uuid::Uuid::new_v4())).unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let people = client().database("CSFLE").collection("people").unwrap();
        people.insert_one(Document::new().with("name", "Taylor")).unwrap();
        people.insert_one(Document::new().with("name", "Thomas")).unwrap();

        let thomas = people.find_one(&Document::new().with("name", "Thomas")).unwrap().unwrap();
        assert_eq!(thomas.get_str("name"), Some("Thomas"));
        assert_eq!(people.find(&Document::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_update_and_delete() {
        let people = client().database("CSFLE").collection("people").unwrap();
        people.insert_one(Document::new().with("name", "Taylor")).unwrap();

        let update = Document::new().with("$set", Document::new().with("contacts.city", "Oakland"));
        assert_eq!(people.update_one(&Document::new().with("name", "Taylor"), &update).unwrap(), 1);
        let taylor = people.find_one(&Document::new()).unwrap().unwrap();
        assert_eq!(taylor.get_path("contacts.city"), Some(&Value::from("Oakland")));

        assert_eq!(people.delete_many(&Document::new().with("name", "Taylor")).unwrap(), 1);
        assert!(people.find_one(&Document::new()).unwrap().is_none());
    }

    #[test]
    fn test_coll_mod_and_drop() {
        let client = client();
        let db = client.database("CSFLE");
        assert!(matches!(db.run_coll_mod("people", Document::new()), Err(Error::NamespaceNotFound(_))));

        db.create_collection("people", CollectionOptions::default()).unwrap();
        db.run_coll_mod("people", Document::new().with("$jsonSchema", Document::new())).unwrap();
        assert_eq!(db.list_collection_names().unwrap(), vec!["people".to_string()]);

        db.drop().unwrap();
        assert!(db.list_collection_names().unwrap().is_empty());
    }

    #[test]
    fn test_closed_client() {
        let client = client();
        let people = client.database("CSFLE").collection("people").unwrap();
        client.close();
        assert!(client.is_closed());
        assert!(matches!(people.insert_one(Document::new()), Err(Error::ClientClosed)));
    }

    #[test]
    fn test_same_uri_shares_store() {
        let uri = format!("memory://shared-{}", uuid::Uuid::new_v4());
        let a = Client::connect(&uri).unwrap();
        let b = Client::connect(&uri).unwrap();
        a.database("QE").collection("people").unwrap().insert_one(Document::new()).unwrap();
        assert_eq!(b.database("QE").collection("people").unwrap().find(&Document::new()).unwrap().len(), 1);
    }
}
