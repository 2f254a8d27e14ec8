//! Flow configuration.
//!
//! [`DemoConfig`] names the collections and key file a flow works with;
//! [`Credentials`] say where the store is. Both are plain values passed into
//! the flows.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::key_vault::{alt_name, reset_pattern, DEFAULT_KEY_VAULT};
use crate::namespace::Namespace;

/// Default master key file.
pub const DEFAULT_MASTER_KEY_PATH: &str = "./master-key.txt";

/// Names and paths used by a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Database holding the sample collection
    pub database: String,
    /// Sample collection
    pub collection: String,
    /// Key vault location, `database.collection`
    pub key_vault: String,
    /// Master key file
    pub master_key_path: PathBuf,
    /// Key provider name recorded on data keys
    pub provider: String,
}

impl DemoConfig {
    fn preset(database: &str) -> Self {
        Self {
            database: database.to_string(),
            collection: "people".to_string(),
            key_vault: DEFAULT_KEY_VAULT.to_string(),
            master_key_path: PathBuf::from(DEFAULT_MASTER_KEY_PATH),
            provider: "local".to_string(),
        }
    }

    /// `CSFLE.people`, key vault `encryption.__keyVault`.
    #[must_use]
    pub fn csfle() -> Self {
        Self::preset("CSFLE")
    }

    /// `QE.people`, key vault `encryption.__keyVault`.
    #[must_use]
    pub fn qe() -> Self {
        Self::preset("QE")
    }

    /// Sets the database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the key vault namespace.
    #[must_use]
    pub fn with_key_vault(mut self, namespace: impl Into<String>) -> Self {
        self.key_vault = namespace.into();
        self
    }

    /// Sets the master key file.
    #[must_use]
    pub fn with_master_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.master_key_path = path.into();
        self
    }

    /// Sample collection namespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` if a name is empty.
    pub fn data_namespace(&self) -> Result<Namespace, Error> {
        Namespace::new(&self.database, &self.collection)
    }

    /// Key vault namespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNamespace` if `key_vault` is malformed.
    pub fn key_vault_namespace(&self) -> Result<Namespace, Error> {
        self.key_vault.parse()
    }

    /// Alternate name of a field's data key.
    #[must_use]
    pub fn alt_name(&self, field: &str) -> String {
        alt_name(field, &self.collection, &self.database)
    }

    /// Pattern matching every key of the sample collection.
    #[must_use]
    pub fn reset_pattern(&self) -> String {
        reset_pattern(&self.collection, &self.database)
    }
}

/// Where the store is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Connection string
    #[serde(rename = "MONGODB_URI")]
    pub uri: String,
    /// Query-analysis shared library
    #[serde(rename = "SHARED_LIB_PATH", default)]
    pub shared_lib_path: Option<PathBuf>,
}

impl Credentials {
    /// Credentials for a connection string.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), shared_lib_path: None }
    }

    /// Sets the shared library path.
    #[must_use]
    pub fn with_shared_lib_path(mut self, path: Option<PathBuf>) -> Self {
        self.shared_lib_path = path;
        self
    }

    /// Reads a TOML credentials file:
    ///
    /// ```toml
    /// MONGODB_URI = "file://./fieldvault.json"
    /// SHARED_LIB_PATH = "/opt/lib/mongo_crypt_v1.so"
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Reads `MONGODB_URI` and `SHARED_LIB_PATH` from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `MONGODB_URI` is not set.
    pub fn from_env() -> Result<Self, Error> {
        let uri = std::env::var("MONGODB_URI")
            .map_err(|_| Error::Config("MONGODB_URI is not set".to_string()))?;
        let shared_lib_path = std::env::var_os("SHARED_LIB_PATH").map(PathBuf::from);
        Ok(Self { uri, shared_lib_path })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_presets() {
        let csfle = DemoConfig::csfle();
        assert_eq!(csfle.data_namespace().unwrap().to_string(), "CSFLE.people");
        assert_eq!(csfle.key_vault_namespace().unwrap().to_string(), DEFAULT_KEY_VAULT);
        assert!(csfle.clone().with_key_vault("vault").key_vault_namespace().is_err());
        assert_eq!(csfle.alt_name("ssn"), "ssn.people.CSFLE");

        let qe = DemoConfig::qe().with_collection("patients");
        assert_eq!(qe.data_namespace().unwrap().to_string(), "QE.patients");
        assert_eq!(qe.alt_name("dob"), "dob.patients.QE");
    }

    #[test]
    fn test_load_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MONGODB_URI = \"memory://creds\"").unwrap();
        writeln!(file, "SHARED_LIB_PATH = \"/opt/lib/mongo_crypt_v1.so\"").unwrap();

        let creds = Credentials::load(file.path()).unwrap();
        assert_eq!(creds.uri, "memory://creds");
        assert_eq!(creds.shared_lib_path, Some(PathBuf::from("/opt/lib/mongo_crypt_v1.so")));
    }

    #[test]
    fn test_shared_lib_path_is_optional() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MONGODB_URI = \"memory://creds\"").unwrap();
        assert_eq!(Credentials::load(file.path()).unwrap(), Credentials::new("memory://creds"));
    }

    #[test]
    fn test_missing_uri_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SHARED_LIB_PATH = \"/opt\"").unwrap();
        assert!(matches!(Credentials::load(file.path()), Err(Error::Config(_))));
    }
}
