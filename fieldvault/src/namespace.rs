//! `database.collection` namespaces.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Creates a namespace from its parts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` if either part is empty or the
    /// database name contains a dot.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Result<Self, Error> {
        let database = database.into();
        let collection = collection.into();
        if database.is_empty() || collection.is_empty() {
            return Err(Error::InvalidNamespace(format!("{database}.{collection}")));
        }
        if database.contains('.') {
            return Err(Error::InvalidNamespace(format!(
                "database name may not contain '.': {database}"
            )));
        }
        Ok(Self { database, collection })
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

    /// Returns a sibling namespace in the same database.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` if `collection` is empty.
    pub fn sibling(&self, collection: impl Into<String>) -> Result<Self, Error> {
        Self::new(self.database.clone(), collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    /// Splits on the first dot; collection names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (database, collection) =
            s.split_once('.').ok_or_else(|| Error::InvalidNamespace(s.to_string()))?;
        Self::new(database, collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_dot() {
        let ns: Namespace = "encryption.__keyVault".parse().unwrap();
        assert_eq!(ns.database(), "encryption");
        assert_eq!(ns.collection(), "__keyVault");

        let ns: Namespace = "QE.enxcol_.people.esc".parse().unwrap();
        assert_eq!(ns.database(), "QE");
        assert_eq!(ns.collection(), "enxcol_.people.esc");
        assert_eq!(ns.to_string(), "QE.enxcol_.people.esc");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("people".parse::<Namespace>().is_err());
        assert!(".people".parse::<Namespace>().is_err());
        assert!("CSFLE.".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_sibling() {
        let ns = Namespace::new("QE", "people").unwrap();
        assert_eq!(ns.sibling("enxcol_.people.esc").unwrap().to_string(), "QE.enxcol_.people.esc");
    }
}
