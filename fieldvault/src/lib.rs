//! # fieldvault
//!
//! Client-side field level encryption (CSFLE) and queryable encryption (QE)
//! over a document store.
//!
//! ## Features
//!
//! - Per-field data keys kept in a key-vault collection, wrapped by a
//!   master key provider
//! - Deterministic encryption (AES-256-SIV) for fields that must stay
//!   searchable by equality
//! - Randomized encryption (ChaCha20-Poly1305) for everything else
//! - Queryable encryption: equality tags (HMAC-SHA256) kept alongside the
//!   document in `__safeContent__`
//! - Encrypted sessions that encrypt on write, rewrite equality filters and
//!   decrypt on read
//! - An in-process document store with unique indexes, validators and
//!   encrypted-collection metadata
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldvault::prelude::*;
//!
//! let provider = Arc::new(LocalKeyProvider::open("./master-key.txt")?);
//! let client = EncryptedClient::connect(
//!     "memory://demo",
//!     AutoEncryptionOptions::new(DEFAULT_KEY_VAULT.parse()?, provider),
//! )?;
//!
//! let fields = EncryptedFields::new()
//!     .field(EncryptedField::new("ssn", ValueType::String).queryable(QueryType::Equality));
//! let (people, _) = client
//!     .client_encryption()
//!     .create_encrypted_collection(&client.database("QE"), "people", fields)?;
//!
//! people.insert_one(Document::new().with("name", "Thomas").with("ssn", "290-66-1234"))?;
//! let thomas = people.find_one(&Document::new().with("ssn", "290-66-1234"))?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod algorithm;
pub mod blind_index;
pub mod cipher;
pub mod config;
pub mod context;
pub mod demo;
pub mod deterministic;
pub mod driver;
pub mod error;
pub mod event;
pub mod header;
pub mod kdf;
pub mod key_provider;
pub mod key_vault;
pub mod namespace;
pub mod randomized;
pub mod schema;
pub mod session;
pub mod store;
pub mod value;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::algorithm::{Algorithm, EncryptionMode, QueryType};
    pub use crate::config::{Credentials, DemoConfig};
    pub use crate::context::{EncryptionContext, IndexContext};
    pub use crate::driver::{Driver, Policy, RunReport, StepOutcome};
    pub use crate::error::{Error, ErrorKind, KeyProviderError};
    pub use crate::event::{Event, Observer, SessionKind, TracingObserver};
    pub use crate::key_provider::KeyProvider;
    pub use crate::key_vault::{KeyId, KeyVault, DEFAULT_KEY_VAULT};
    pub use crate::namespace::Namespace;
    pub use crate::schema::{EncryptSpec, EncryptedField, EncryptedFields, JsonSchema, SchemaMap};
    pub use crate::session::{
        AutoEncryptionOptions, Client, ClientEncryption, EncryptedClient, EncryptedCollection,
    };
    pub use crate::store::{DocumentStore, MemoryStore};
    pub use crate::value::{Binary, Document, Value, ValueType};
}
