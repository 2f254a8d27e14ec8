//! Document and value model.
//!
//! Values mirror the subset of BSON the encryption flows need. They render to
//! relaxed extended JSON for display and snapshots, and to CBOR when a value
//! becomes the plaintext of an encrypted payload.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::error::Error;

/// Binary payload with a BSON-style subtype byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binary {
    /// Subtype byte
    pub subtype: u8,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

impl Binary {
    /// Generic binary data.
    pub const GENERIC: u8 = 0x00;
    /// RFC 4122 UUID.
    pub const UUID: u8 = 0x04;
    /// Encrypted field value.
    pub const ENCRYPTED: u8 = 0x06;

    /// Creates a binary value.
    #[must_use]
    pub const fn new(subtype: u8, bytes: Vec<u8>) -> Self {
        Self { subtype, bytes }
    }

    /// Returns `true` for encrypted field payloads.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.subtype == Self::ENCRYPTED
    }
}

/// 12-byte document identifier: 4-byte big-endian timestamp and 8 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        // Timestamps past 2106 wrap; ordering only matters within a run.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = Utc::now().timestamp() as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parses a 24-character hex string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the string is not 12 hex-encoded bytes.
    pub fn parse_str(s: &str) -> Result<Self, Error> {
        let raw = hex::decode(s).map_err(|e| Error::InvalidDocument(format!("bad ObjectId: {e}")))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| Error::InvalidDocument(format!("ObjectId must be 12 bytes: {s}")))?;
        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Declared or observed type of a value, named as in BSON schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `null`
    Null,
    /// `bool`
    Bool,
    /// `long`
    Long,
    /// `string`
    String,
    /// `date`
    Date,
    /// `binData`
    BinData,
    /// `objectId`
    ObjectId,
    /// `array`
    Array,
    /// `object`
    Object,
}

impl ValueType {
    /// BSON element type code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::String => 0x02,
            Self::Object => 0x03,
            Self::Array => 0x04,
            Self::BinData => 0x05,
            Self::ObjectId => 0x07,
            Self::Bool => 0x08,
            Self::Date => 0x09,
            Self::Null => 0x0A,
            Self::Long => 0x12,
        }
    }

    /// Inverse of [`ValueType::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Self::String),
            0x03 => Some(Self::Object),
            0x04 => Some(Self::Array),
            0x05 => Some(Self::BinData),
            0x07 => Some(Self::ObjectId),
            0x08 => Some(Self::Bool),
            0x09 => Some(Self::Date),
            0x0A => Some(Self::Null),
            0x12 => Some(Self::Long),
            _ => None,
        }
    }

    /// Schema name of the type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Long => "long",
            Self::String => "string",
            Self::Date => "date",
            Self::BinData => "binData",
            Self::ObjectId => "objectId",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether deterministic encryption may be declared for this type.
    ///
    /// Structured and low-cardinality types would leak too much through
    /// equal ciphertexts, so only scalar identifiers qualify.
    #[must_use]
    pub const fn supports_deterministic(self) -> bool {
        matches!(self, Self::String | Self::Date | Self::Long | Self::BinData | Self::ObjectId)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "bool" => Ok(Self::Bool),
            "long" => Ok(Self::Long),
            "string" => Ok(Self::String),
            "date" => Ok(Self::Date),
            "binData" => Ok(Self::BinData),
            "objectId" => Ok(Self::ObjectId),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(Error::InvalidDeclaration(format!("unknown bsonType '{other}'"))),
        }
    }
}

/// A document value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp with millisecond precision; build it through `From`
    /// so finer digits are dropped.
    DateTime(DateTime<Utc>),
    /// Binary data.
    Binary(Binary),
    /// Document identifier.
    ObjectId(ObjectId),
    /// Ordered list.
    Array(Vec<Value>),
    /// Embedded document.
    Document(Document),
}

impl Value {
    /// Runtime type of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Long,
            Self::String(_) => ValueType::String,
            Self::DateTime(_) => ValueType::Date,
            Self::Binary(_) => ValueType::BinData,
            Self::ObjectId(_) => ValueType::ObjectId,
            Self::Array(_) => ValueType::Array,
            Self::Document(_) => ValueType::Object,
        }
    }

    /// Returns the string slice for string values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the embedded document.
    #[must_use]
    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Returns the array elements.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the binary payload.
    #[must_use]
    pub const fn as_binary(&self) -> Option<&Binary> {
        match self {
            Self::Binary(bin) => Some(bin),
            _ => None,
        }
    }

    /// Returns the integer value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the timestamp.
    #[must_use]
    pub const fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Returns `true` for an encrypted field payload.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Binary(bin) if bin.is_encrypted())
    }

    /// Encodes the value as CBOR, the plaintext form of encrypted payloads.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a value produced by [`Value::to_cbor`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if the bytes are not a valid encoding.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, Error> {
        ciborium::de::from_reader(bytes).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Renders the value as relaxed extended JSON.
    #[must_use]
    pub fn to_extended_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(n) => json!(n),
            Self::String(s) => Json::String(s.clone()),
            Self::DateTime(dt) => json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) }),
            Self::Binary(bin) => json!({
                "$binary": { "base64": STANDARD.encode(&bin.bytes), "subType": format!("{:02x}", bin.subtype) }
            }),
            Self::ObjectId(oid) => json!({ "$oid": oid.to_string() }),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_extended_json).collect()),
            Self::Document(doc) => doc.to_extended_json(),
        }
    }

    /// Parses relaxed extended JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` for floats and malformed `$date`,
    /// `$binary` or `$oid` wrappers.
    pub fn from_extended_json(json: &Json) -> Result<Self, Error> {
        match json {
            Json::Null => Ok(Self::Null),
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| Error::InvalidDocument(format!("unsupported number {n}"))),
            Json::String(s) => Ok(Self::String(s.clone())),
            Json::Array(items) => {
                items.iter().map(Self::from_extended_json).collect::<Result<_, _>>().map(Self::Array)
            }
            Json::Object(map) => Self::from_json_object(map),
        }
    }

    fn from_json_object(map: &Map<String, Json>) -> Result<Self, Error> {
        if map.len() == 1 {
            if let Some(date) = map.get("$date") {
                let text = date
                    .as_str()
                    .ok_or_else(|| Error::InvalidDocument("$date must be a string".to_string()))?;
                let dt = DateTime::parse_from_rfc3339(text)
                    .map_err(|e| Error::InvalidDocument(format!("bad $date '{text}': {e}")))?;
                return Ok(Self::from(dt.with_timezone(&Utc)));
            }
            if let Some(oid) = map.get("$oid") {
                let text = oid
                    .as_str()
                    .ok_or_else(|| Error::InvalidDocument("$oid must be a string".to_string()))?;
                return ObjectId::parse_str(text).map(Self::ObjectId);
            }
            if let Some(Json::Object(bin)) = map.get("$binary") {
                let data = bin.get("base64").and_then(Json::as_str).unwrap_or_default();
                let subtype = bin.get("subType").and_then(Json::as_str).unwrap_or("00");
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| Error::InvalidDocument(format!("bad $binary payload: {e}")))?;
                let subtype = u8::from_str_radix(subtype, 16)
                    .map_err(|e| Error::InvalidDocument(format!("bad $binary subType: {e}")))?;
                return Ok(Self::Binary(Binary::new(subtype, bytes)));
            }
        }
        Document::from_json_map(map).map(Self::Document)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_extended_json())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt.trunc_subsecs(3))
    }
}

impl From<Binary> for Value {
    fn from(bin: Binary) -> Self {
        Self::Binary(bin)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Self::ObjectId(oid)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

/// Returns midnight UTC of the given calendar day.
///
/// Out-of-range dates clamp to the earliest representable day.
#[must_use]
pub fn utc_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN);
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// A document: string keys mapped to values, kept in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a mutable top-level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if the top-level field exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterates fields mutably in key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.0.iter_mut()
    }

    /// Resolves a dotted path through embedded documents.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.as_document()?.get(segment)?;
        }
        Some(current)
    }

    /// Resolves a dotted path mutably through embedded documents.
    pub fn get_path_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut segments = path.split('.');
        let mut current = self.get_mut(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get_mut(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns a string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns an embedded document field.
    #[must_use]
    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    /// Returns an array field.
    #[must_use]
    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    /// Renders the document as relaxed extended JSON.
    #[must_use]
    pub fn to_extended_json(&self) -> Json {
        Json::Object(self.0.iter().map(|(k, v)| (k.clone(), v.to_extended_json())).collect())
    }

    /// Parses a relaxed extended JSON object.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocument` if the JSON is not an object or any
    /// value is malformed.
    pub fn from_extended_json(json: &Json) -> Result<Self, Error> {
        match json {
            Json::Object(map) => Self::from_json_map(map),
            other => Err(Error::InvalidDocument(format!("expected a JSON object, got {other}"))),
        }
    }

    fn from_json_map(map: &Map<String, Json>) -> Result<Self, Error> {
        map.iter()
            .map(|(k, v)| Value::from_extended_json(v).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    /// Pretty-printed extended JSON, used for narration.
    #[must_use]
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_extended_json()).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_extended_json())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Document {
        Document::new()
            .with("name", "Taylor")
            .with("dob", utc_date(1989, 12, 13))
            .with("contacts", Document::new().with("mobile", "212-867-5309").with("city", "New York"))
            .with("array_data", vec![Value::from(Document::new().with("foo", 1)), Value::from("secret")])
    }

    #[test]
    fn test_get_path_walks_nested_documents() {
        let doc = contact();
        assert_eq!(doc.get_path("contacts.mobile"), Some(&Value::from("212-867-5309")));
        assert_eq!(doc.get_path("contacts.missing"), None);
        assert_eq!(doc.get_path("name.first"), None);
    }

    #[test]
    fn test_get_path_mut_replaces_nested_value() {
        let mut doc = contact();
        if let Some(slot) = doc.get_path_mut("contacts.mobile") {
            *slot = Value::Null;
        }
        assert_eq!(doc.get_path("contacts.mobile"), Some(&Value::Null));
    }

    #[test]
    fn test_extended_json_round_trip() {
        let doc = contact()
            .with("_id", ObjectId::new())
            .with("blob", Binary::new(Binary::ENCRYPTED, vec![1, 2, 3]));

        let json = doc.to_extended_json();
        assert_eq!(json["dob"]["$date"], "1989-12-13T00:00:00.000Z");
        assert_eq!(json["blob"]["$binary"]["subType"], "06");

        let parsed = Document::from_extended_json(&json).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_dates_keep_millisecond_precision() {
        let precise = Utc.with_ymd_and_hms(1989, 12, 13, 0, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        let value = Value::from(precise);
        assert_eq!(value.as_datetime().map(DateTime::timestamp_subsec_nanos), Some(123_000_000));

        let json = serde_json::json!({ "$date": "1989-12-13T00:00:00.123456789Z" });
        assert_eq!(Value::from_extended_json(&json).unwrap(), value);
    }

    #[test]
    fn test_extended_json_rejects_floats() {
        let json = serde_json::json!({ "num": 1.5 });
        assert!(matches!(Document::from_extended_json(&json), Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_cbor_preserves_types() {
        let values = [
            Value::from("1989-12-13"),
            Value::from(utc_date(1989, 12, 13)),
            Value::from(contact()),
            Value::Null,
        ];
        for value in values {
            let bytes = value.to_cbor().unwrap();
            assert_eq!(Value::from_cbor(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_cbor_is_stable_for_equal_values() {
        let first = Value::from(contact()).to_cbor().unwrap();
        let second = Value::from(contact()).to_cbor().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_type_codes_round_trip() {
        for ty in [
            ValueType::Null,
            ValueType::Bool,
            ValueType::Long,
            ValueType::String,
            ValueType::Date,
            ValueType::BinData,
            ValueType::ObjectId,
            ValueType::Array,
            ValueType::Object,
        ] {
            assert_eq!(ValueType::from_code(ty.code()), Some(ty));
            assert_eq!(ty.name().parse::<ValueType>().unwrap(), ty);
        }
        assert!("decimal".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_deterministic_support() {
        assert!(ValueType::String.supports_deterministic());
        assert!(ValueType::Date.supports_deterministic());
        assert!(!ValueType::Object.supports_deterministic());
        assert!(!ValueType::Array.supports_deterministic());
        assert!(!ValueType::Bool.supports_deterministic());
    }

    #[test]
    fn test_object_id_hex() {
        let oid = ObjectId::new();
        assert_eq!(ObjectId::parse_str(&oid.to_string()).unwrap(), oid);
        assert!(ObjectId::parse_str("abc").is_err());
    }
}
