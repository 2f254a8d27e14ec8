//! Context types for encryption and equality-tag operations.

use std::fmt;

use crate::namespace::Namespace;

/// Context for encryption operations, used as associated data.
///
/// The context ensures that:
/// - Different databases produce different ciphertexts
/// - Different collections/fields produce different ciphertexts
/// - A ciphertext copied to another field fails authentication
///
/// # Example
///
/// ```
/// use fieldvault::context::EncryptionContext;
///
/// let ctx = EncryptionContext::new("CSFLE", "people", "contacts.mobile");
/// assert_eq!(ctx.to_string(), "CSFLE|people|contacts.mobile");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionContext {
    database: String,
    collection: String,
    path: String,
}

impl EncryptionContext {
    /// Creates a new encryption context.
    ///
    /// # Arguments
    ///
    /// * `database` - Database name
    /// * `collection` - Collection name
    /// * `path` - Dotted field path
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self { database: database.into(), collection: collection.into(), path: path.into() }
    }

    /// Creates a context for a field of the given namespace.
    #[must_use]
    pub fn for_field(namespace: &Namespace, path: impl Into<String>) -> Self {
        Self::new(namespace.database(), namespace.collection(), path)
    }

    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the field path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.database, self.collection, self.path)
    }
}

/// Context for equality tag generation.
///
/// Tags are namespaced separately from ciphertexts so that the same key
/// never produces a tag equal to any ciphertext prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexContext {
    database: String,
    collection: String,
    path: String,
}

impl IndexContext {
    /// Creates a new index context.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self { database: database.into(), collection: collection.into(), path: path.into() }
    }

    /// Returns the field path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for IndexContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eq|{}|{}|{}", self.database, self.collection, self.path)
    }
}

impl From<&EncryptionContext> for IndexContext {
    fn from(ctx: &EncryptionContext) -> Self {
        Self {
            database: ctx.database.clone(),
            collection: ctx.collection.clone(),
            path: ctx.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_context_display() {
        let ctx = EncryptionContext::new("CSFLE", "people", "ssn");
        assert_eq!(ctx.to_string(), "CSFLE|people|ssn");
    }

    #[test]
    fn test_encryption_context_for_field() {
        let ns = Namespace::new("QE", "people").unwrap();
        let ctx = EncryptionContext::for_field(&ns, "contacts.mobile");
        assert_eq!(ctx.database(), "QE");
        assert_eq!(ctx.collection(), "people");
        assert_eq!(ctx.path(), "contacts.mobile");
    }

    #[test]
    fn test_index_context_display() {
        let ctx = IndexContext::new("QE", "people", "ssn");
        assert_eq!(ctx.to_string(), "eq|QE|people|ssn");
    }

    #[test]
    fn test_index_context_from_encryption_context() {
        let enc_ctx = EncryptionContext::new("QE", "people", "dob");
        let idx_ctx = IndexContext::from(&enc_ctx);
        assert_eq!(idx_ctx.path(), "dob");
        assert_eq!(idx_ctx.to_string(), "eq|QE|people|dob");
    }
}
