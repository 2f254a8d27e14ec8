//! In-process document store.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use super::{CollectionOptions, DocumentStore, Filter, IndexModel, Update};
use crate::error::Error;
use crate::namespace::Namespace;
use crate::value::{Document, ObjectId, Value};

/// Stores opened through [`super::connect`], keyed by connection string.
static REGISTRY: LazyLock<Mutex<HashMap<String, Arc<MemoryStore>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the store registered under `uri`, opening it on first use.
pub(super) fn shared<F>(uri: &str, open: F) -> Result<Arc<MemoryStore>, Error>
where
    F: FnOnce() -> Result<MemoryStore, Error>,
{
    let mut registry = REGISTRY.lock();
    if let Some(store) = registry.get(uri) {
        return Ok(Arc::clone(store));
    }
    let store = Arc::new(open()?);
    registry.insert(uri.to_string(), Arc::clone(&store));
    debug!(uri, "opened document store");
    Ok(store)
}

#[derive(Debug, Clone, Default)]
struct Collection {
    options: CollectionOptions,
    indexes: Vec<IndexModel>,
    documents: Vec<Document>,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<Namespace, Collection>,
}

/// Document store held in memory, optionally persisted to a JSON snapshot.
///
/// Emulates the server behaviour the encryption flows rely on: `_id`
/// assignment, unique (multikey, partial) indexes, `$jsonSchema` validators
/// that require encrypted payloads at declared paths, and queryable-encryption
/// collections with their auxiliary `enxcol_` collections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates an empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a snapshot file, loading it if it exists.
    ///
    /// Every mutation rewrites the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            debug!(path = %path.display(), collections = snapshot.collections.len(), "loaded snapshot");
            snapshot.restore()?
        } else {
            State::default()
        };
        Ok(Self { state: RwLock::new(state), snapshot: Some(path) })
    }

    /// Snapshot file, if the store is persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> Result<T, Error>) -> Result<T, Error> {
        let mut state = self.state.write();
        let out = f(&mut state)?;
        self.persist(&state)?;
        Ok(out)
    }

    fn persist(&self, state: &State) -> Result<(), Error> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&Snapshot::capture(state))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, namespace: &Namespace, mut document: Document) -> Result<Value, Error> {
        self.mutate(|state| {
            let id = match document.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Value::ObjectId(ObjectId::new());
                    document.insert("_id", id.clone());
                    id
                }
            };

            check_field_names(&document)?;
            let collection = state.collections.entry(namespace.clone()).or_default();
            if collection.documents.iter().any(|d| d.get("_id") == Some(&id)) {
                return Err(Error::DuplicateKey { index: "_id_".to_string(), key: id.to_string() });
            }
            validate(&collection.options, &document)?;
            check_unique(collection, &document, None)?;

            collection.documents.push(document);
            debug!(%namespace, %id, "inserted document");
            Ok(id)
        })
    }

    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<Document>, Error> {
        let state = self.state.read();
        let Some(collection) = state.collections.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for document in &collection.documents {
            if filter.matches(document)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, Error> {
        self.mutate(|state| {
            let Some(collection) = state.collections.get_mut(namespace) else {
                return Ok(0);
            };
            let mut position = None;
            for (i, document) in collection.documents.iter().enumerate() {
                if filter.matches(document)? {
                    position = Some(i);
                    break;
                }
            }
            let Some(i) = position else {
                return Ok(0);
            };

            let mut updated = collection.documents[i].clone();
            update.apply(&mut updated)?;
            if updated.get("_id") != collection.documents[i].get("_id") {
                return Err(Error::InvalidDocument("_id is immutable".to_string()));
            }
            check_field_names(&updated)?;
            validate(&collection.options, &updated)?;
            check_unique(collection, &updated, Some(i))?;

            collection.documents[i] = updated;
            Ok(1)
        })
    }

    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64, Error> {
        self.mutate(|state| {
            let Some(collection) = state.collections.get_mut(namespace) else {
                return Ok(0);
            };
            let mut doomed = Vec::new();
            for document in &collection.documents {
                doomed.push(filter.matches(document)?);
            }
            let mut flags = doomed.iter();
            collection.documents.retain(|_| !flags.next().copied().unwrap_or(false));

            let deleted = doomed.iter().filter(|d| **d).count();
            debug!(%namespace, deleted, "deleted documents");
            Ok(deleted as u64)
        })
    }

    fn create_index(&self, namespace: &Namespace, index: IndexModel) -> Result<String, Error> {
        self.mutate(|state| {
            let collection = state.collections.entry(namespace.clone()).or_default();
            let name = index.name();
            if collection.indexes.iter().any(|existing| existing.name() == name) {
                return Ok(name);
            }

            if index.is_unique() {
                let mut seen: Vec<Vec<Value>> = Vec::new();
                for document in &collection.documents {
                    for key in index_keys(&index, document)? {
                        if seen.contains(&key) {
                            return Err(Error::DuplicateKey { index: name, key: render_key(&key) });
                        }
                        seen.push(key);
                    }
                }
            }

            debug!(%namespace, index = %name, unique = index.is_unique(), "created index");
            collection.indexes.push(index);
            Ok(name)
        })
    }

    fn create_collection(
        &self,
        namespace: &Namespace,
        options: CollectionOptions,
    ) -> Result<(), Error> {
        self.mutate(|state| {
            if state.collections.contains_key(namespace) {
                return Err(Error::NamespaceExists(namespace.to_string()));
            }
            if options.encrypted_fields.is_some() {
                for aux in auxiliary_collections(namespace)? {
                    state.collections.entry(aux).or_default();
                }
            }
            state.collections.insert(namespace.clone(), Collection { options, ..Collection::default() });
            debug!(%namespace, "created collection");
            Ok(())
        })
    }

    fn collection_options(
        &self,
        namespace: &Namespace,
    ) -> Result<Option<CollectionOptions>, Error> {
        Ok(self.state.read().collections.get(namespace).map(|c| c.options.clone()))
    }

    fn set_validator(&self, namespace: &Namespace, validator: Document) -> Result<(), Error> {
        self.mutate(|state| {
            let collection = state
                .collections
                .get_mut(namespace)
                .ok_or_else(|| Error::NamespaceNotFound(namespace.to_string()))?;
            collection.options.validator = Some(validator);
            debug!(%namespace, "installed validator");
            Ok(())
        })
    }

    fn list_collections(&self, database: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .state
            .read()
            .collections
            .keys()
            .filter(|ns| ns.database() == database)
            .map(|ns| ns.collection().to_string())
            .collect())
    }

    fn drop_collection(&self, namespace: &Namespace) -> Result<bool, Error> {
        self.mutate(|state| {
            let Some(dropped) = state.collections.remove(namespace) else {
                return Ok(false);
            };
            if dropped.options.encrypted_fields.is_some() {
                for aux in auxiliary_collections(namespace)? {
                    state.collections.remove(&aux);
                }
            }
            debug!(%namespace, "dropped collection");
            Ok(true)
        })
    }

    fn drop_database(&self, database: &str) -> Result<(), Error> {
        self.mutate(|state| {
            state.collections.retain(|ns, _| ns.database() != database);
            debug!(database, "dropped database");
            Ok(())
        })
    }
}

/// `enxcol_.<coll>.esc` and `enxcol_.<coll>.ecoc` for an encrypted collection.
fn auxiliary_collections(namespace: &Namespace) -> Result<[Namespace; 2], Error> {
    let coll = namespace.collection();
    Ok([
        namespace.sibling(format!("enxcol_.{coll}.esc"))?,
        namespace.sibling(format!("enxcol_.{coll}.ecoc"))?,
    ])
}

/// Stored field names may not start with `$`; the snapshot reserves
/// single-key `$date`, `$oid` and `$binary` documents for typed values.
fn check_field_names(document: &Document) -> Result<(), Error> {
    fn check_value(value: &Value) -> Result<(), Error> {
        match value {
            Value::Document(doc) => check_field_names(doc),
            Value::Array(items) => items.iter().try_for_each(check_value),
            _ => Ok(()),
        }
    }
    for (name, value) in document.iter() {
        if name.starts_with('$') {
            return Err(Error::InvalidDocument(format!("field name '{name}' may not start with '$'")));
        }
        check_value(value)?;
    }
    Ok(())
}

/// Enforces the collection validator and encrypted-field metadata.
fn validate(options: &CollectionOptions, document: &Document) -> Result<(), Error> {
    if let Some(schema) = options.validator.as_ref().and_then(|v| v.get_document("$jsonSchema")) {
        check_schema(schema, document, "")?;
    }

    let declared = options.encrypted_fields.as_ref().and_then(|f| f.get_array("fields"));
    for field in declared.unwrap_or_default().iter().filter_map(Value::as_document) {
        let Some(path) = field.get_str("path") else {
            continue;
        };
        if document.get_path(path).is_some_and(|v| !v.is_encrypted()) {
            return Err(Error::DocumentValidation(format!(
                "field '{path}' of an encrypted collection must be encrypted"
            )));
        }
    }
    Ok(())
}

fn check_schema(schema: &Document, document: &Document, prefix: &str) -> Result<(), Error> {
    let Some(properties) = schema.get_document("properties") else {
        return Ok(());
    };
    for (name, spec) in properties {
        let Some(spec) = spec.as_document() else {
            continue;
        };
        let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
        match document.get(name) {
            Some(value) if spec.contains_key("encrypt") => {
                if !value.is_encrypted() {
                    return Err(Error::DocumentValidation(format!(
                        "field '{path}' must be encrypted"
                    )));
                }
            }
            Some(Value::Document(inner)) => check_schema(spec, inner, &path)?,
            _ => {}
        }
    }
    Ok(())
}

/// Index keys of a document; arrays contribute one key per element.
fn index_keys(index: &IndexModel, document: &Document) -> Result<Vec<Vec<Value>>, Error> {
    if let Some(filter) = index.partial_filter_expression() {
        if !filter.matches(document)? {
            return Ok(Vec::new());
        }
    }

    let mut keys: Vec<Vec<Value>> = vec![Vec::new()];
    for path in index.keys() {
        let values = match document.get_path(path) {
            Some(Value::Array(items)) if !items.is_empty() => items.clone(),
            Some(value) => vec![value.clone()],
            None => vec![Value::Null],
        };
        keys = keys
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    key
                })
            })
            .collect();
    }
    Ok(keys)
}

fn check_unique(collection: &Collection, document: &Document, skip: Option<usize>) -> Result<(), Error> {
    for index in collection.indexes.iter().filter(|i| i.is_unique()) {
        let keys = index_keys(index, document)?;
        if keys.is_empty() {
            continue;
        }
        for (i, other) in collection.documents.iter().enumerate() {
            if Some(i) == skip {
                continue;
            }
            let other_keys = index_keys(index, other)?;
            if let Some(key) = keys.iter().find(|k| other_keys.contains(k)) {
                return Err(Error::DuplicateKey { index: index.name(), key: render_key(key) });
            }
        }
    }
    Ok(())
}

fn render_key(key: &[Value]) -> String {
    key.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collections: Vec<SnapshotCollection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCollection {
    namespace: String,
    #[serde(default)]
    options: Option<Json>,
    #[serde(default)]
    indexes: Vec<Json>,
    #[serde(default)]
    documents: Vec<Json>,
}

impl Snapshot {
    fn capture(state: &State) -> Self {
        let collections = state
            .collections
            .iter()
            .map(|(namespace, collection)| SnapshotCollection {
                namespace: namespace.to_string(),
                options: Some(collection.options.to_document().to_extended_json()),
                indexes: collection.indexes.iter().map(|i| i.to_document().to_extended_json()).collect(),
                documents: collection.documents.iter().map(Document::to_extended_json).collect(),
            })
            .collect();
        Self { collections }
    }

    fn restore(self) -> Result<State, Error> {
        let mut state = State::default();
        for entry in self.collections {
            let namespace: Namespace = entry.namespace.parse()?;
            let options = match &entry.options {
                Some(json) => CollectionOptions::from_document(&Document::from_extended_json(json)?),
                None => CollectionOptions::default(),
            };
            let indexes = entry
                .indexes
                .iter()
                .map(|json| Document::from_extended_json(json).and_then(|d| IndexModel::from_document(&d)))
                .collect::<Result<Vec<_>, _>>()?;
            let documents = entry
                .documents
                .iter()
                .map(Document::from_extended_json)
                .collect::<Result<Vec<_>, _>>()?;
            state.collections.insert(namespace, Collection { options, indexes, documents });
        }
        Ok(state)
    }
}
