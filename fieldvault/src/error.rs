//! Error types for `fieldvault` operations.

use std::fmt;
use std::path::PathBuf;

use crate::value::ValueType;

/// Main error type for `fieldvault` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Authentication tag verification failed (data may be corrupted or tampered)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// Key provider operation failed
    #[error("key provider error: {0}")]
    KeyProvider(#[from] KeyProviderError),

    /// Encrypted payload header parsing failed
    #[error("invalid payload header: {0}")]
    InvalidHeader(String),

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// Key material has the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Equality tag generation failed
    #[error("equality tag generation failed: {0}")]
    TokenGenerationFailed(String),

    /// No data key with the given id exists in the key vault
    #[error("data key not found: {0}")]
    KeyNotFound(String),

    /// No data key carries the given alternate name
    #[error("no data key with alternate name '{0}'")]
    KeyAltNameNotFound(String),

    /// A unique index rejected a write
    #[error("duplicate key error on index '{index}': {key}")]
    DuplicateKey {
        /// Name of the violated index
        index: String,
        /// Rendered key that collided
        key: String,
    },

    /// A collection validator rejected a document
    #[error("document failed validation: {0}")]
    DocumentValidation(String),

    /// Declared and actual value types differ
    #[error("type mismatch at '{path}': declared {expected}, found {actual}")]
    TypeMismatch {
        /// Field path
        path: String,
        /// Declared type
        expected: ValueType,
        /// Runtime type
        actual: ValueType,
    },

    /// A filter references an encrypted field in a way that cannot be answered
    #[error("cannot query '{path}': {reason}")]
    QueryNotSupported {
        /// Field path
        path: String,
        /// Why the query was refused
        reason: String,
    },

    /// A field declaration or schema is malformed
    #[error("invalid field declaration: {0}")]
    InvalidDeclaration(String),

    /// A document or filter is malformed
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Namespace string could not be parsed
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// The collection does not exist
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// The collection already exists
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),

    /// Connection string could not be parsed
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Connection string names a backend this build cannot reach
    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),

    /// The configured query-analysis library is not reachable
    #[error("query analysis library unavailable at {}", .0.display())]
    QueryAnalysisUnavailable(PathBuf),

    /// The session has been closed
    #[error("client is closed")]
    ClientClosed,

    /// Value encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of failures, used by the step driver to decide
/// whether a run may continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Environment is unusable: key file, store, query analysis, configuration.
    Setup,
    /// A data key could not be resolved or created.
    KeyResolution,
    /// A single database operation was rejected.
    Operation,
    /// A single value could not be encrypted or decrypted.
    Encryption,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::KeyResolution => "key-resolution",
            Self::Operation => "operation",
            Self::Encryption => "encryption",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyProvider(_)
            | Self::InvalidDeclaration(_)
            | Self::InvalidNamespace(_)
            | Self::InvalidConnectionString(_)
            | Self::UnsupportedScheme(_)
            | Self::QueryAnalysisUnavailable(_)
            | Self::ClientClosed
            | Self::Config(_)
            | Self::Io(_) => ErrorKind::Setup,
            Self::KeyAltNameNotFound(_) => ErrorKind::KeyResolution,
            Self::EncryptionFailed(_)
            | Self::DecryptionFailed(_)
            | Self::AuthenticationFailed
            | Self::InvalidHeader(_)
            | Self::KeyDerivation
            | Self::InvalidKeyLength { .. }
            | Self::TokenGenerationFailed(_)
            | Self::KeyNotFound(_)
            | Self::TypeMismatch { .. }
            | Self::Codec(_) => ErrorKind::Encryption,
            Self::DuplicateKey { .. }
            | Self::DocumentValidation(_)
            | Self::QueryNotSupported { .. }
            | Self::InvalidDocument(_)
            | Self::NamespaceNotFound(_)
            | Self::NamespaceExists(_)
            | Self::Json(_) => ErrorKind::Operation,
        }
    }

    /// Returns `true` when no later step can be meaningful after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Setup | ErrorKind::KeyResolution)
    }
}

/// Errors specific to key provider operations.
#[derive(Debug)]
pub enum KeyProviderError {
    /// Master key file is missing
    MasterKeyNotFound(PathBuf),

    /// Master key material is malformed
    InvalidMasterKey(String),

    /// DEK wrapping failed
    WrapFailed(String),

    /// DEK unwrapping failed
    UnwrapFailed(String),

    /// Provider name does not match the key record
    ProviderMismatch {
        /// Provider that was asked
        expected: String,
        /// Provider recorded on the key
        actual: String,
    },

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MasterKeyNotFound(path) => {
                write!(f, "master key file not found: {}", path.display())
            }
            Self::InvalidMasterKey(msg) => write!(f, "invalid master key: {msg}"),
            Self::WrapFailed(msg) => write!(f, "DEK wrap failed: {msg}"),
            Self::UnwrapFailed(msg) => write!(f, "DEK unwrap failed: {msg}"),
            Self::ProviderMismatch { expected, actual } => {
                write!(f, "key was wrapped by provider '{actual}', not '{expected}'")
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
