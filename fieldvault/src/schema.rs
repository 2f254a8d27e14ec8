//! Encrypted field declarations.
//!
//! CSFLE declares fields through a JSON schema supplied when a session is
//! opened:
//!
//! ```text
//! {bsonType: "object", properties: {
//!     ssn: {encrypt: {bsonType: "string", algorithm: "...-Deterministic", keyId: [uuid]}},
//!     contacts: {bsonType: "object", properties: {mobile: {encrypt: {...}}}}
//! }}
//! ```
//!
//! Queryable encryption fixes the field list when the collection is created:
//!
//! ```text
//! {fields: [{path: "contacts.mobile", bsonType: "string", keyId: uuid,
//!            queries: {queryType: "equality"}}]}
//! ```
//!
//! Both shapes reduce to a [`FieldMap`]: a validated set of dotted paths, each
//! with its type, encryption mode and data key.

use std::collections::BTreeMap;

use crate::algorithm::{Algorithm, EncryptionMode, QueryType};
use crate::error::Error;
use crate::key_vault::KeyId;
use crate::namespace::Namespace;
use crate::value::{Document, Value, ValueType};

/// The `encrypt` clause of a CSFLE schema property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptSpec {
    bson_type: ValueType,
    algorithm: Algorithm,
    key_id: KeyId,
}

impl EncryptSpec {
    /// Creates an `encrypt` clause.
    #[must_use]
    pub const fn new(bson_type: ValueType, algorithm: Algorithm, key_id: KeyId) -> Self {
        Self { bson_type, algorithm, key_id }
    }

    /// Deterministic clause.
    #[must_use]
    pub const fn deterministic(bson_type: ValueType, key_id: KeyId) -> Self {
        Self::new(bson_type, Algorithm::Deterministic, key_id)
    }

    /// Randomized clause.
    #[must_use]
    pub const fn random(bson_type: ValueType, key_id: KeyId) -> Self {
        Self::new(bson_type, Algorithm::Random, key_id)
    }

    /// Declared type.
    #[must_use]
    pub const fn bson_type(&self) -> ValueType {
        self.bson_type
    }

    /// Declared algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Data key.
    #[must_use]
    pub const fn key_id(&self) -> KeyId {
        self.key_id
    }

    fn to_document(&self) -> Document {
        Document::new()
            .with("bsonType", self.bson_type.name())
            .with("algorithm", self.algorithm.name())
            .with("keyId", vec![self.key_id.to_value()])
    }

    fn from_document(path: &str, document: &Document) -> Result<Self, Error> {
        let invalid = |what: &str| Error::InvalidDeclaration(format!("'{path}': {what}"));

        let bson_type = document
            .get_str("bsonType")
            .ok_or_else(|| invalid("encrypt needs bsonType"))?
            .parse::<ValueType>()?;
        let algorithm = document
            .get_str("algorithm")
            .ok_or_else(|| invalid("encrypt needs algorithm"))?
            .parse::<Algorithm>()?;
        let key_id = match document.get("keyId") {
            Some(Value::Array(ids)) if ids.len() == 1 => KeyId::from_value(&ids[0])?,
            Some(Value::Array(_)) => return Err(invalid("keyId must list exactly one key")),
            Some(value) => KeyId::from_value(value)?,
            None => return Err(invalid("encrypt needs keyId")),
        };
        Ok(Self { bson_type, algorithm, key_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Property {
    Encrypt(EncryptSpec),
    Object(JsonSchema),
}

/// CSFLE schema of one collection: an object with, possibly nested,
/// encrypted properties.
///
/// # Example
///
/// ```
/// use fieldvault::key_vault::KeyId;
/// use fieldvault::schema::{EncryptSpec, JsonSchema};
/// use fieldvault::value::ValueType;
///
/// let key = KeyId::new_v4();
/// let schema = JsonSchema::object()
///     .encrypt("ssn", EncryptSpec::deterministic(ValueType::String, key))
///     .property(
///         "contacts",
///         JsonSchema::object().encrypt("mobile", EncryptSpec::random(ValueType::String, key)),
///     );
///
/// let paths: Vec<_> = schema.declarations().into_iter().map(|d| d.path).collect();
/// assert_eq!(paths, ["contacts.mobile", "ssn"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonSchema {
    properties: BTreeMap<String, Property>,
}

impl JsonSchema {
    /// An object schema without properties.
    #[must_use]
    pub fn object() -> Self {
        Self::default()
    }

    /// Declares an encrypted property.
    #[must_use]
    pub fn encrypt(mut self, name: impl Into<String>, spec: EncryptSpec) -> Self {
        self.properties.insert(name.into(), Property::Encrypt(spec));
        self
    }

    /// Declares an embedded object property with its own schema.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: Self) -> Self {
        self.properties.insert(name.into(), Property::Object(schema));
        self
    }

    /// Flattens the schema to dotted-path declarations.
    #[must_use]
    pub fn declarations(&self) -> Vec<FieldDeclaration> {
        let mut out = Vec::new();
        self.collect("", &mut out);
        out
    }

    fn collect(&self, prefix: &str, out: &mut Vec<FieldDeclaration>) {
        for (name, property) in &self.properties {
            let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
            match property {
                Property::Encrypt(spec) => out.push(FieldDeclaration {
                    path,
                    value_type: spec.bson_type,
                    mode: spec.algorithm.into(),
                    key_id: spec.key_id,
                }),
                Property::Object(nested) => nested.collect(&path, out),
            }
        }
    }

    /// Renders the schema document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let properties = self
            .properties
            .iter()
            .map(|(name, property)| {
                let rendered = match property {
                    Property::Encrypt(spec) => Document::new().with("encrypt", spec.to_document()),
                    Property::Object(nested) => nested.to_document(),
                };
                (name.clone(), Value::from(rendered))
            })
            .collect::<Document>();
        Document::new().with("bsonType", "object").with("properties", properties)
    }

    /// Parses a schema document. Properties that neither encrypt nor nest
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if an `encrypt` clause is malformed.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        Self::parse("", document)
    }

    fn parse(prefix: &str, document: &Document) -> Result<Self, Error> {
        let mut schema = Self::object();
        let Some(properties) = document.get_document("properties") else {
            return Ok(schema);
        };
        for (name, value) in properties {
            let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
            let Some(property) = value.as_document() else {
                return Err(Error::InvalidDeclaration(format!("'{path}': property must be a document")));
            };
            if let Some(encrypt) = property.get_document("encrypt") {
                schema = schema.encrypt(name.clone(), EncryptSpec::from_document(&path, encrypt)?);
            } else if property.contains_key("properties") {
                schema = schema.property(name.clone(), Self::parse(&path, property)?);
            }
        }
        Ok(schema)
    }

    /// The server-side validator enforcing this schema (`{$jsonSchema: ...}`).
    #[must_use]
    pub fn to_validator(&self) -> Document {
        Document::new().with("$jsonSchema", self.to_document())
    }
}

/// CSFLE schemas keyed by namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMap(BTreeMap<Namespace, JsonSchema>);

impl SchemaMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collection schema.
    #[must_use]
    pub fn with(mut self, namespace: Namespace, schema: JsonSchema) -> Self {
        self.0.insert(namespace, schema);
        self
    }

    /// Returns the schema of a collection.
    #[must_use]
    pub fn get(&self, namespace: &Namespace) -> Option<&JsonSchema> {
        self.0.get(namespace)
    }

    /// Whether no schema is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Configured schemas in namespace order.
    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, &JsonSchema)> {
        self.0.iter()
    }

    /// Renders `{"<db>.<coll>": schema, ...}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        self.0.iter().map(|(ns, schema)| (ns.to_string(), Value::from(schema.to_document()))).collect()
    }

    /// Parses `{"<db>.<coll>": schema, ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is not a namespace or a schema is malformed.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let mut map = Self::new();
        for (ns, schema) in document {
            let schema = schema
                .as_document()
                .ok_or_else(|| Error::InvalidDeclaration(format!("schema for {ns} must be a document")))?;
            map = map.with(ns.parse()?, JsonSchema::from_document(schema)?);
        }
        Ok(map)
    }
}

/// One entry of a queryable-encryption field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Dotted field path
    pub path: String,
    /// Declared type
    pub bson_type: ValueType,
    /// Data key; filled in at collection creation when absent
    pub key_id: Option<KeyId>,
    /// Supported query, if the field is searchable
    pub queries: Option<QueryType>,
}

impl EncryptedField {
    /// A non-queryable field without a key yet.
    #[must_use]
    pub fn new(path: impl Into<String>, bson_type: ValueType) -> Self {
        Self { path: path.into(), bson_type, key_id: None, queries: None }
    }

    /// Sets the data key.
    #[must_use]
    pub fn with_key_id(mut self, key_id: KeyId) -> Self {
        self.key_id = Some(key_id);
        self
    }

    /// Makes the field searchable.
    #[must_use]
    pub fn queryable(mut self, query: QueryType) -> Self {
        self.queries = Some(query);
        self
    }

    /// Encryption mode implied by `queries`.
    #[must_use]
    pub const fn mode(&self) -> EncryptionMode {
        match self.queries {
            Some(QueryType::Equality) => EncryptionMode::Indexed,
            None => EncryptionMode::Unindexed,
        }
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::new().with("path", self.path.as_str());
        doc.insert("bsonType", self.bson_type.name());
        if let Some(key_id) = self.key_id {
            doc.insert("keyId", key_id.to_value());
        }
        if let Some(query) = self.queries {
            doc.insert("queries", Document::new().with("queryType", query.name()));
        }
        doc
    }

    fn from_document(document: &Document) -> Result<Self, Error> {
        let path = document
            .get_str("path")
            .ok_or_else(|| Error::InvalidDeclaration("encrypted field needs a path".to_string()))?;
        let bson_type = document
            .get_str("bsonType")
            .ok_or_else(|| Error::InvalidDeclaration(format!("'{path}': missing bsonType")))?
            .parse::<ValueType>()?;
        let key_id = document.get("keyId").map(KeyId::from_value).transpose()?;

        // `queries` may be a single document or a one-element array of them
        let query_doc = match document.get("queries") {
            Some(Value::Document(q)) => Some(q),
            Some(Value::Array(items)) => items.first().and_then(Value::as_document),
            _ => None,
        };
        let queries = query_doc
            .map(|q| {
                q.get_str("queryType")
                    .ok_or_else(|| Error::InvalidDeclaration(format!("'{path}': missing queryType")))?
                    .parse::<QueryType>()
            })
            .transpose()?;

        Ok(Self { path: path.to_string(), bson_type, key_id, queries })
    }
}

/// Queryable-encryption field list of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedFields {
    /// Declared fields
    pub fields: Vec<EncryptedField>,
}

impl EncryptedFields {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: EncryptedField) -> Self {
        self.fields.push(field);
        self
    }

    /// Renders `{fields: [...]}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        Document::new().with(
            "fields",
            self.fields.iter().map(|f| Value::from(f.to_document())).collect::<Vec<_>>(),
        )
    }

    /// Parses `{fields: [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if an entry is malformed.
    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let fields = document
            .get_array("fields")
            .ok_or_else(|| Error::InvalidDeclaration("encryptedFields needs 'fields'".to_string()))?
            .iter()
            .map(|entry| {
                entry
                    .as_document()
                    .ok_or_else(|| Error::InvalidDeclaration("field entries must be documents".to_string()))
                    .and_then(EncryptedField::from_document)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }
}

/// One encrypted field: where it is, what it holds, how and with which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    /// Dotted field path
    pub path: String,
    /// Declared type
    pub value_type: ValueType,
    /// Encryption mode
    pub mode: EncryptionMode,
    /// Data key
    pub key_id: KeyId,
}

/// How a field path relates to the declarations of a [`FieldMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch<'a> {
    /// The path is declared.
    Declared(&'a FieldDeclaration),
    /// The path lies inside a declared (encrypted) value.
    Inside(&'a FieldDeclaration),
    /// The path is an ancestor of a declared path.
    Ancestor(&'a FieldDeclaration),
    /// The path is not encrypted.
    Plain,
}

/// Validated set of encrypted fields for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    declarations: Vec<FieldDeclaration>,
}

impl FieldMap {
    /// Validates and builds a field map.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if a path is empty, declared
    /// twice, or overlaps another, or if a deterministic or indexed field
    /// has a non-scalar type.
    pub fn new(declarations: Vec<FieldDeclaration>) -> Result<Self, Error> {
        for (i, decl) in declarations.iter().enumerate() {
            if decl.path.is_empty() || decl.path.split('.').any(str::is_empty) {
                return Err(Error::InvalidDeclaration(format!("invalid path '{}'", decl.path)));
            }
            if decl.mode.supports_equality() && !decl.value_type.supports_deterministic() {
                return Err(Error::InvalidDeclaration(format!(
                    "'{}': {} encryption is not allowed for {} values",
                    decl.path, decl.mode, decl.value_type
                )));
            }
            for other in &declarations[i + 1..] {
                if other.path == decl.path {
                    return Err(Error::InvalidDeclaration(format!(
                        "'{}' is declared more than once",
                        decl.path
                    )));
                }
                if is_prefix(&decl.path, &other.path) || is_prefix(&other.path, &decl.path) {
                    return Err(Error::InvalidDeclaration(format!(
                        "'{}' and '{}' overlap",
                        decl.path, other.path
                    )));
                }
            }
        }
        Ok(Self { declarations })
    }

    /// Field map of a CSFLE schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if validation fails.
    pub fn from_schema(schema: &JsonSchema) -> Result<Self, Error> {
        Self::new(schema.declarations())
    }

    /// Field map of a queryable-encryption field list.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeclaration` if a field has no key id or
    /// validation fails.
    pub fn from_encrypted_fields(fields: &EncryptedFields) -> Result<Self, Error> {
        let declarations = fields
            .fields
            .iter()
            .map(|f| {
                let key_id = f.key_id.ok_or_else(|| {
                    Error::InvalidDeclaration(format!("'{}' has no keyId", f.path))
                })?;
                Ok(FieldDeclaration {
                    path: f.path.clone(),
                    value_type: f.bson_type,
                    mode: f.mode(),
                    key_id,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Self::new(declarations)
    }

    /// Declaration of exactly `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FieldDeclaration> {
        self.declarations.iter().find(|d| d.path == path)
    }

    /// Classifies a path against the declarations.
    #[must_use]
    pub fn lookup(&self, path: &str) -> PathMatch<'_> {
        for decl in &self.declarations {
            if decl.path == path {
                return PathMatch::Declared(decl);
            }
            if is_prefix(&decl.path, path) {
                return PathMatch::Inside(decl);
            }
            if is_prefix(path, &decl.path) {
                return PathMatch::Ancestor(decl);
            }
        }
        PathMatch::Plain
    }

    /// Whether any field uses queryable encryption.
    #[must_use]
    pub fn is_queryable_encryption(&self) -> bool {
        self.declarations
            .iter()
            .any(|d| matches!(d.mode, EncryptionMode::Indexed | EncryptionMode::Unindexed))
    }

    /// Iterates declarations.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.declarations.iter()
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether no field is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// `parent` is a strict dotted prefix of `path`.
fn is_prefix(parent: &str, path: &str) -> bool {
    path.len() > parent.len() && path.starts_with(parent) && path.as_bytes()[parent.len()] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people_schema(keys: &[KeyId; 5]) -> JsonSchema {
        JsonSchema::object()
            .encrypt("ssn", EncryptSpec::deterministic(ValueType::String, keys[0]))
            .encrypt("dob", EncryptSpec::deterministic(ValueType::Date, keys[1]))
            .encrypt("object_data", EncryptSpec::random(ValueType::Object, keys[2]))
            .encrypt("array_data", EncryptSpec::random(ValueType::Array, keys[3]))
            .property(
                "contacts",
                JsonSchema::object().encrypt("mobile", EncryptSpec::random(ValueType::String, keys[4])),
            )
    }

    fn keys() -> [KeyId; 5] {
        [KeyId::new_v4(), KeyId::new_v4(), KeyId::new_v4(), KeyId::new_v4(), KeyId::new_v4()]
    }

    #[test]
    fn test_schema_flattens_nested_properties() {
        let keys = keys();
        let map = FieldMap::from_schema(&people_schema(&keys)).unwrap();

        assert_eq!(map.len(), 5);
        let mobile = map.get("contacts.mobile").unwrap();
        assert_eq!(mobile.mode, EncryptionMode::Random);
        assert_eq!(mobile.key_id, keys[4]);
        assert_eq!(map.get("ssn").unwrap().mode, EncryptionMode::Deterministic);
        assert!(!map.is_queryable_encryption());
    }

    #[test]
    fn test_schema_document_round_trip() {
        let schema = people_schema(&keys());
        let doc = schema.to_document();
        assert_eq!(doc.get_str("bsonType"), Some("object"));
        assert!(doc.get_path("properties.contacts.properties.mobile.encrypt").is_some());
        assert_eq!(JsonSchema::from_document(&doc).unwrap(), schema);

        let ns: Namespace = "CSFLE.people".parse().unwrap();
        let map = SchemaMap::new().with(ns.clone(), schema.clone());
        let parsed = SchemaMap::from_document(&map.to_document()).unwrap();
        assert_eq!(parsed.get(&ns), Some(&schema));
        assert_eq!(schema.to_validator().get_document("$jsonSchema"), Some(&doc));
    }

    #[test]
    fn test_schema_rejects_unknown_algorithm() {
        let doc = Document::new().with(
            "properties",
            Document::new().with(
                "ssn",
                Document::new().with(
                    "encrypt",
                    Document::new()
                        .with("bsonType", "string")
                        .with("algorithm", "ROT13")
                        .with("keyId", vec![KeyId::new_v4().to_value()]),
                ),
            ),
        );
        assert!(matches!(JsonSchema::from_document(&doc), Err(Error::InvalidDeclaration(_))));
    }

    #[test]
    fn test_nested_and_dotted_declarations_agree() {
        let key = KeyId::new_v4();
        let nested = JsonSchema::object().property(
            "contacts",
            JsonSchema::object().encrypt("mobile", EncryptSpec::random(ValueType::String, key)),
        );
        let dotted = EncryptedFields::new()
            .field(EncryptedField::new("contacts.mobile", ValueType::String).with_key_id(key));

        let a = FieldMap::from_schema(&nested).unwrap();
        let b = FieldMap::from_encrypted_fields(&dotted).unwrap();
        assert_eq!(a.get("contacts.mobile").unwrap().path, b.get("contacts.mobile").unwrap().path);
        assert_eq!(a.get("contacts.mobile").unwrap().key_id, b.get("contacts.mobile").unwrap().key_id);
    }

    #[test]
    fn test_encrypted_fields_document() {
        let key = KeyId::new_v4();
        let fields = EncryptedFields::new()
            .field(EncryptedField::new("ssn", ValueType::String).with_key_id(key).queryable(QueryType::Equality))
            .field(EncryptedField::new("object_data", ValueType::Object));

        let doc = fields.to_document();
        let parsed = EncryptedFields::from_document(&doc).unwrap();
        assert_eq!(parsed, fields);
        assert_eq!(parsed.fields[0].mode(), EncryptionMode::Indexed);
        assert_eq!(parsed.fields[1].mode(), EncryptionMode::Unindexed);

        // keyless fields are fine in the list but not in a field map
        assert!(matches!(FieldMap::from_encrypted_fields(&parsed), Err(Error::InvalidDeclaration(_))));
    }

    #[test]
    fn test_queries_accepts_array_form() {
        let entry = Document::new()
            .with("path", "ssn")
            .with("bsonType", "string")
            .with("queries", vec![Value::from(Document::new().with("queryType", "equality"))]);
        let doc = Document::new().with("fields", vec![Value::from(entry)]);
        let parsed = EncryptedFields::from_document(&doc).unwrap();
        assert_eq!(parsed.fields[0].queries, Some(QueryType::Equality));
    }

    #[test]
    fn test_overlapping_paths_rejected() {
        let key = KeyId::new_v4();
        let decl = |path: &str, value_type| FieldDeclaration {
            path: path.to_string(),
            value_type,
            mode: EncryptionMode::Random,
            key_id: key,
        };

        let overlap = FieldMap::new(vec![
            decl("contacts", ValueType::Object),
            decl("contacts.mobile", ValueType::String),
        ]);
        assert!(matches!(overlap, Err(Error::InvalidDeclaration(_))));

        let twice = FieldMap::new(vec![decl("ssn", ValueType::String), decl("ssn", ValueType::String)]);
        assert!(matches!(twice, Err(Error::InvalidDeclaration(_))));

        let siblings = FieldMap::new(vec![
            decl("contacts.mobile", ValueType::String),
            decl("contacts.mobile_alt", ValueType::String),
        ]);
        assert!(siblings.is_ok());
    }

    #[test]
    fn test_deterministic_object_rejected() {
        let schema = JsonSchema::object()
            .encrypt("object_data", EncryptSpec::deterministic(ValueType::Object, KeyId::new_v4()));
        assert!(matches!(FieldMap::from_schema(&schema), Err(Error::InvalidDeclaration(_))));

        let fields = EncryptedFields::new().field(
            EncryptedField::new("array_data", ValueType::Array)
                .with_key_id(KeyId::new_v4())
                .queryable(QueryType::Equality),
        );
        assert!(matches!(FieldMap::from_encrypted_fields(&fields), Err(Error::InvalidDeclaration(_))));
    }

    #[test]
    fn test_lookup() {
        let map = FieldMap::from_schema(&people_schema(&keys())).unwrap();
        assert!(matches!(map.lookup("ssn"), PathMatch::Declared(_)));
        assert!(matches!(map.lookup("object_data.num"), PathMatch::Inside(_)));
        assert!(matches!(map.lookup("contacts"), PathMatch::Ancestor(_)));
        assert_eq!(map.lookup("contacts.city"), PathMatch::Plain);
        assert_eq!(map.lookup("name"), PathMatch::Plain);
    }
}
