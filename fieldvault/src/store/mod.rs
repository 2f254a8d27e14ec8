//! Document store abstraction.
//!
//! Sessions talk to the database through [`DocumentStore`]. Filters, updates
//! and index definitions are typed here and convert to and from the query
//! documents a server would receive, so schema maps and key-vault indexes
//! can be written and read back in their familiar shape.

mod memory;

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;

pub use memory::MemoryStore;

use crate::error::Error;
use crate::namespace::Namespace;
use crate::value::{Document, Value};

/// Operations a session needs from the database.
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, assigning an `_id` when absent. Returns the `_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if a unique index rejects the document
    /// and `Error::DocumentValidation` if the collection validator does.
    fn insert_one(&self, namespace: &Namespace, document: Document) -> Result<Value, Error>;

    /// Returns every document matching `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the filter cannot be evaluated.
    fn find(&self, namespace: &Namespace, filter: &Filter) -> Result<Vec<Document>, Error>;

    /// Applies `update` to the first matching document. Returns the number
    /// of documents matched (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the update violates an index or validator.
    fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, Error>;

    /// Deletes every matching document. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the filter cannot be evaluated.
    fn delete_many(&self, namespace: &Namespace, filter: &Filter) -> Result<u64, Error>;

    /// Creates an index if no index with the same name exists. Returns the
    /// index name.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if existing documents violate a new
    /// unique index.
    fn create_index(&self, namespace: &Namespace, index: IndexModel) -> Result<String, Error>;

    /// Creates a collection explicitly.
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceExists` if the collection already exists.
    fn create_collection(
        &self,
        namespace: &Namespace,
        options: CollectionOptions,
    ) -> Result<(), Error>;

    /// Returns the options of a collection, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn collection_options(&self, namespace: &Namespace)
        -> Result<Option<CollectionOptions>, Error>;

    /// Replaces the validator of an existing collection (`collMod`).
    ///
    /// # Errors
    ///
    /// Returns `Error::NamespaceNotFound` if the collection does not exist.
    fn set_validator(&self, namespace: &Namespace, validator: Document) -> Result<(), Error>;

    /// Lists the collection names of a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_collections(&self, database: &str) -> Result<Vec<String>, Error>;

    /// Drops a collection. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn drop_collection(&self, namespace: &Namespace) -> Result<bool, Error>;

    /// Drops every collection of a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn drop_database(&self, database: &str) -> Result<(), Error>;
}

/// Opens the store named by a connection string.
///
/// * `memory://<name>` - process-wide in-memory store shared by every
///   connection using the same name
/// * `file://<path>` - in-memory store persisted to a JSON snapshot
///
/// # Errors
///
/// Returns `Error::InvalidConnectionString` if the string has no scheme or
/// no target, and `Error::UnsupportedScheme` for any other scheme.
pub fn connect(uri: &str) -> Result<Arc<dyn DocumentStore>, Error> {
    let (scheme, target) = uri
        .split_once("://")
        .ok_or_else(|| Error::InvalidConnectionString(format!("missing scheme in '{uri}'")))?;
    if target.is_empty() {
        return Err(Error::InvalidConnectionString(format!("missing target in '{uri}'")));
    }

    let store: Arc<dyn DocumentStore> = match scheme {
        "memory" => memory::shared(uri, || Ok(MemoryStore::new()))?,
        "file" => {
            let path = target.to_string();
            memory::shared(uri, move || MemoryStore::open(path))?
        }
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };
    Ok(store)
}

/// Query filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals value; an array field also matches on any element.
    Eq {
        /// Dotted field path
        path: String,
        /// Value to compare with
        value: Value,
    },
    /// Field presence.
    Exists {
        /// Dotted field path
        path: String,
        /// Whether the field must be present
        exists: bool,
    },
    /// String field matches a regular expression.
    Regex {
        /// Dotted field path
        path: String,
        /// Regular expression source
        pattern: String,
    },
    /// Every sub-filter matches.
    And(Vec<Filter>),
}

impl Filter {
    /// Equality filter.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { path: path.into(), value: value.into() }
    }

    /// Presence filter.
    #[must_use]
    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Self::Exists { path: path.into(), exists }
    }

    /// Regular-expression filter.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the pattern does not compile.
    pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Result<Self, Error> {
        let pattern = pattern.into();
        Regex::new(&pattern)
            .map_err(|e| Error::InvalidDocument(format!("invalid $regex '{pattern}': {e}")))?;
        Ok(Self::Regex { path: path.into(), pattern })
    }

    /// Field paths referenced by this filter.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::All => Vec::new(),
            Self::Eq { path, .. } | Self::Exists { path, .. } | Self::Regex { path, .. } => {
                vec![path.as_str()]
            }
            Self::And(filters) => filters.iter().flat_map(Self::paths).collect(),
        }
    }

    /// Evaluates the filter against a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if a regular expression does not compile.
    pub fn matches(&self, document: &Document) -> Result<bool, Error> {
        match self {
            Self::All => Ok(true),
            Self::Eq { path, value } => Ok(match document.get_path(path) {
                Some(Value::Array(items)) if !matches!(value, Value::Array(_)) => {
                    items.contains(value)
                }
                Some(found) => found == value,
                None => matches!(value, Value::Null),
            }),
            Self::Exists { path, exists } => Ok(document.get_path(path).is_some() == *exists),
            Self::Regex { path, pattern } => {
                let re = Regex::new(pattern)
                    .map_err(|e| Error::InvalidDocument(format!("invalid $regex: {e}")))?;
                Ok(match document.get_path(path) {
                    Some(Value::String(s)) => re.is_match(s),
                    Some(Value::Array(items)) => {
                        items.iter().filter_map(Value::as_str).any(|s| re.is_match(s))
                    }
                    _ => false,
                })
            }
            Self::And(filters) => {
                for filter in filters {
                    if !filter.matches(document)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Renders the filter as a query document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        match self {
            Self::All => Document::new(),
            Self::Eq { path, value } => Document::new().with(path.clone(), value.clone()),
            Self::Exists { path, exists } => {
                Document::new().with(path.clone(), Document::new().with("$exists", *exists))
            }
            Self::Regex { path, pattern } => {
                Document::new().with(path.clone(), Document::new().with("$regex", pattern.as_str()))
            }
            Self::And(filters) => Document::new().with(
                "$and",
                filters.iter().map(|f| Value::from(f.to_document())).collect::<Vec<_>>(),
            ),
        }
    }

    /// Parses a query document.
    ///
    /// Supported operators: `$eq`, `$exists`, `$regex` and `$and`. Several
    /// top-level fields combine with `$and`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for any other operator.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let mut filters = Vec::with_capacity(document.len());
        for (key, value) in document {
            if key == "$and" {
                let clauses = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidDocument("$and expects an array".to_string()))?;
                let parsed = clauses
                    .iter()
                    .map(|clause| {
                        clause.as_document().ok_or_else(|| {
                            Error::InvalidDocument("$and clauses must be documents".to_string())
                        })
                    })
                    .map(|clause| clause.and_then(Self::from_document))
                    .collect::<Result<Vec<_>, _>>()?;
                filters.push(Self::And(parsed));
            } else if key.starts_with('$') {
                return Err(Error::InvalidDocument(format!("unsupported operator {key}")));
            } else {
                filters.push(Self::field_filter(key, value)?);
            }
        }

        Ok(match filters.len() {
            0 => Self::All,
            1 => filters.remove(0),
            _ => Self::And(filters),
        })
    }

    fn field_filter(path: &str, value: &Value) -> Result<Self, Error> {
        let Some(ops) = value.as_document().filter(|d| d.iter().any(|(k, _)| k.starts_with('$')))
        else {
            return Ok(Self::eq(path, value.clone()));
        };

        let mut clauses = Vec::with_capacity(ops.len());
        for (op, operand) in ops {
            let clause = match (op.as_str(), operand) {
                ("$eq", v) => Self::eq(path, v.clone()),
                ("$exists", Value::Bool(b)) => Self::exists(path, *b),
                ("$regex", Value::String(pattern)) => Self::regex(path, pattern.as_str())?,
                (op, _) => {
                    return Err(Error::InvalidDocument(format!(
                        "unsupported operator {op} on '{path}'"
                    )))
                }
            };
            clauses.push(clause);
        }
        Ok(if clauses.len() == 1 { clauses.remove(0) } else { Self::And(clauses) })
    }
}

/// Update operators applied by [`DocumentStore::update_one`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    add_to_set: Vec<(String, Value)>,
    current_date: Vec<String>,
}

impl Update {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `$set`: replaces the value at `path`.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    /// `$addToSet`: appends `value` to the array at `path` unless present.
    #[must_use]
    pub fn add_to_set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.push((path.into(), value.into()));
        self
    }

    /// `$currentDate`: sets `path` to the current time.
    #[must_use]
    pub fn current_date(mut self, path: impl Into<String>) -> Self {
        self.current_date.push(path.into());
        self
    }

    /// Applies the update to a document in place.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if `$addToSet` targets a non-array
    /// or a path runs through a non-document value.
    pub fn apply(&self, document: &mut Document) -> Result<(), Error> {
        for (path, value) in &self.set {
            set_path(document, path, value.clone())?;
        }
        for (path, value) in &self.add_to_set {
            match document.get_path_mut(path) {
                Some(Value::Array(items)) => {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                Some(other) => {
                    return Err(Error::InvalidDocument(format!(
                        "$addToSet on non-array field '{path}' of type {}",
                        other.value_type()
                    )))
                }
                None => set_path(document, path, Value::Array(vec![value.clone()]))?,
            }
        }
        let now = Utc::now();
        for path in &self.current_date {
            set_path(document, path, Value::from(now))?;
        }
        Ok(())
    }

    /// Renders the update as an update document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if !self.set.is_empty() {
            doc.insert("$set", self.set.iter().cloned().collect::<Document>());
        }
        if !self.add_to_set.is_empty() {
            doc.insert("$addToSet", self.add_to_set.iter().cloned().collect::<Document>());
        }
        if !self.current_date.is_empty() {
            doc.insert(
                "$currentDate",
                self.current_date.iter().map(|p| (p.clone(), Value::Bool(true))).collect::<Document>(),
            );
        }
        doc
    }

    /// Parses an update document using `$set`, `$addToSet` and `$currentDate`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for any other operator.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let mut update = Self::new();
        for (op, fields) in document {
            let fields = fields
                .as_document()
                .ok_or_else(|| Error::InvalidDocument(format!("{op} expects a document")))?;
            for (path, value) in fields {
                update = match op.as_str() {
                    "$set" => update.set(path.clone(), value.clone()),
                    "$addToSet" => update.add_to_set(path.clone(), value.clone()),
                    "$currentDate" => update.current_date(path.clone()),
                    other => {
                        return Err(Error::InvalidDocument(format!(
                            "unsupported update operator {other}"
                        )))
                    }
                };
            }
        }
        Ok(update)
    }
}

/// Sets a dotted path, creating intermediate documents.
fn set_path(document: &mut Document, path: &str, value: Value) -> Result<(), Error> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Value::Document(inner)) => set_path(inner, rest, value),
                _ => Err(Error::InvalidDocument(format!(
                    "cannot set '{path}': '{head}' is not a document"
                ))),
            }
        }
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    keys: Vec<String>,
    name: Option<String>,
    unique: bool,
    partial_filter: Option<Filter>,
}

impl IndexModel {
    /// Ascending index on the given field paths.
    #[must_use]
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            name: None,
            unique: false,
            partial_filter: None,
        }
    }

    /// Overrides the generated index name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rejects documents whose key is already indexed.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Indexes only documents matching `filter`.
    #[must_use]
    pub fn partial_filter(mut self, filter: Filter) -> Self {
        self.partial_filter = Some(filter);
        self
    }

    /// Index name: explicit, or `<path>_1` joined with underscores.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.keys.iter().map(|k| format!("{k}_1")).collect::<Vec<_>>().join("_")
        })
    }

    /// Indexed field paths.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Whether the index is unique.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Partial filter, if any.
    #[must_use]
    pub const fn partial_filter_expression(&self) -> Option<&Filter> {
        self.partial_filter.as_ref()
    }

    /// Renders the index as a `createIndexes` entry.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let keys = self.keys.iter().map(|k| (k.clone(), Value::Int(1))).collect::<Document>();
        let mut doc = Document::new().with("key", keys).with("name", self.name());
        if self.unique {
            doc.insert("unique", true);
        }
        if let Some(filter) = &self.partial_filter {
            doc.insert("partialFilterExpression", filter.to_document());
        }
        doc
    }

    /// Parses a `createIndexes` entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if `key` is missing or empty.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let keys = document
            .get_document("key")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidDocument("index needs a non-empty 'key'".to_string()))?;
        let mut index = Self::new(keys.iter().map(|(k, _)| k.clone()));
        if let Some(name) = document.get_str("name") {
            index = index.with_name(name);
        }
        if let Some(Value::Bool(unique)) = document.get("unique") {
            index = index.unique(*unique);
        }
        if let Some(filter) = document.get_document("partialFilterExpression") {
            index = index.partial_filter(Filter::from_document(filter)?);
        }
        Ok(index)
    }
}

/// Options a collection was created with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionOptions {
    /// Queryable-encryption field list (`encryptedFields`)
    pub encrypted_fields: Option<Document>,
    /// Validator document, e.g. `{$jsonSchema: {...}}`
    pub validator: Option<Document>,
}

impl CollectionOptions {
    /// Options for a queryable-encryption collection.
    #[must_use]
    pub const fn encrypted(encrypted_fields: Document) -> Self {
        Self { encrypted_fields: Some(encrypted_fields), validator: None }
    }

    /// Renders the options as a `create` command body.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(fields) = &self.encrypted_fields {
            doc.insert("encryptedFields", fields.clone());
        }
        if let Some(validator) = &self.validator {
            doc.insert("validator", validator.clone());
        }
        doc
    }

    /// Parses a `create` command body.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self {
            encrypted_fields: document.get_document("encryptedFields").cloned(),
            validator: document.get_document("validator").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_doc() -> Document {
        Document::new()
            .with("keyAltNames", vec![Value::from("ssn.people.CSFLE")])
            .with("status", 0)
            .with("masterKey", Document::new().with("provider", "local"))
    }

    #[test]
    fn test_eq_matches_array_elements() {
        let doc = key_doc();
        assert!(Filter::eq("keyAltNames", "ssn.people.CSFLE").matches(&doc).unwrap());
        assert!(!Filter::eq("keyAltNames", "dob.people.CSFLE").matches(&doc).unwrap());
        assert!(Filter::eq("masterKey.provider", "local").matches(&doc).unwrap());
    }

    #[test]
    fn test_regex_and_exists() {
        let doc = key_doc();
        let re = Filter::regex("keyAltNames", r"\.people\.CSFLE").unwrap();
        assert!(re.matches(&doc).unwrap());
        assert!(Filter::exists("keyAltNames", true).matches(&doc).unwrap());
        assert!(Filter::exists("keyMaterial", false).matches(&doc).unwrap());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(matches!(Filter::regex("name", "(unclosed"), Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_filter_document_forms() {
        let query = Document::new()
            .with("keyAltNames", Document::new().with("$exists", true))
            .with("status", 0);
        let filter = Filter::from_document(&query).unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![Filter::exists("keyAltNames", true), Filter::eq("status", 0)])
        );
        assert_eq!(Filter::from_document(&Document::new()).unwrap(), Filter::All);

        let reparsed =
            Filter::from_document(&Filter::regex("name", "^T").unwrap().to_document()).unwrap();
        assert_eq!(reparsed, Filter::regex("name", "^T").unwrap());
    }

    #[test]
    fn test_filter_rejects_unknown_operator() {
        let query = Document::new().with("age", Document::new().with("$gt", 30));
        assert!(matches!(Filter::from_document(&query), Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_update_add_to_set_and_current_date() {
        let mut doc = key_doc();
        let update = Update::new()
            .add_to_set("keyAltNames", "ssn-autogenerated")
            .add_to_set("keyAltNames", "ssn.people.CSFLE")
            .current_date("updateDate");
        update.apply(&mut doc).unwrap();

        assert_eq!(doc.get_array("keyAltNames").map(<[Value]>::len), Some(2));
        assert!(matches!(doc.get("updateDate"), Some(Value::DateTime(_))));

        let reparsed = Update::from_document(&update.to_document()).unwrap();
        assert_eq!(reparsed, update);
    }

    #[test]
    fn test_update_set_nested_path() {
        let mut doc = Document::new();
        Update::new().set("contacts.mobile", "555-1234").apply(&mut doc).unwrap();
        assert_eq!(doc.get_path("contacts.mobile"), Some(&Value::from("555-1234")));

        let mut doc = Document::new().with("contacts", "flat");
        let result = Update::new().set("contacts.mobile", "x").apply(&mut doc);
        assert!(matches!(result, Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_index_model_document() {
        let index = IndexModel::new(["keyAltNames"])
            .unique(true)
            .partial_filter(Filter::exists("keyAltNames", true));
        assert_eq!(index.name(), "keyAltNames_1");

        let parsed = IndexModel::from_document(&index.to_document()).unwrap();
        assert_eq!(parsed.name(), "keyAltNames_1");
        assert!(parsed.is_unique());
        assert_eq!(parsed.partial_filter_expression(), Some(&Filter::exists("keyAltNames", true)));
    }

    #[test]
    fn test_connect_schemes() {
        assert!(connect("memory://store-mod-test").is_ok());
        assert!(matches!(connect("mongodb://localhost:27017"), Err(Error::UnsupportedScheme(_))));
        assert!(matches!(connect("localhost"), Err(Error::InvalidConnectionString(_))));
        assert!(matches!(connect("memory://"), Err(Error::InvalidConnectionString(_))));
    }
}
