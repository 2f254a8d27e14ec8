//! Database sessions.
//!
//! A [`Client`] reads and writes documents as stored. An [`EncryptedClient`]
//! transparently encrypts declared fields on the way in and decrypts them on
//! the way out; [`ClientEncryption`] manages the data keys it relies on.

mod encrypted;
mod plain;

pub use encrypted::{
    AutoEncryptionOptions, ClientEncryption, EncryptedClient, EncryptedCollection,
    EncryptedDatabase, SAFE_CONTENT,
};
pub use plain::{Client, Collection, Database};
