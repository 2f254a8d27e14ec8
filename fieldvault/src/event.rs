//! Structured events emitted while a flow runs.
//!
//! The flows never print. They report what they did as [`Event`]s to an
//! [`Observer`]; narrating documents to a console, logging through `tracing`
//! or collecting events in a test are all observer implementations.

use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::key_vault::KeyId;
use crate::namespace::Namespace;
use crate::value::{Document, Value};

/// Which kind of session read a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Encryption-aware session; declared fields come back decrypted.
    Encrypted,
    /// Plain session; declared fields come back as ciphertext.
    Plain,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypted => write!(f, "encrypted"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// Event verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Step bookkeeping
    Debug,
    /// Progress of the flow
    Info,
    /// A step failed
    Warn,
}

/// Something a flow did.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A step is about to run.
    StepStarted {
        /// Step name
        name: String,
    },
    /// A step completed.
    StepSucceeded {
        /// Step name
        name: String,
    },
    /// A step returned an error.
    StepFailed {
        /// Step name
        name: String,
        /// Rendered error
        error: String,
        /// Whether the step was declared to fail
        expected: bool,
    },
    /// A session was opened.
    Connected {
        /// Connection string
        uri: String,
        /// Whether the session encrypts
        encrypted: bool,
    },
    /// A session was closed.
    Closed {
        /// Connection string
        uri: String,
    },
    /// Data keys matching a pattern were deleted.
    KeysDeleted {
        /// Alternate-name pattern
        pattern: String,
        /// Number of deleted keys
        count: u64,
    },
    /// An index was created.
    IndexCreated {
        /// Indexed collection
        namespace: Namespace,
        /// Index name
        name: String,
    },
    /// A data key was created.
    DataKeyCreated {
        /// New key id
        key_id: KeyId,
        /// Alternate name, if any
        alt_name: Option<String>,
    },
    /// A data key was looked up by alternate name.
    KeyResolved {
        /// Alternate name
        alt_name: String,
        /// Resolved key id
        key_id: KeyId,
    },
    /// An alternate name was added to a key.
    KeyAltNameAdded {
        /// Key id
        key_id: KeyId,
        /// Added name
        alt_name: String,
    },
    /// Encrypted fields were declared for a collection.
    FieldsDeclared {
        /// Collection
        namespace: Namespace,
        /// Schema or `encryptedFields` document
        declaration: Document,
    },
    /// A collection was dropped.
    CollectionDropped {
        /// Collection
        namespace: Namespace,
    },
    /// A database was dropped.
    DatabaseDropped {
        /// Database name
        database: String,
    },
    /// A queryable-encryption collection was created.
    EncryptedCollectionCreated {
        /// Collection
        namespace: Namespace,
        /// Completed `encryptedFields`
        encrypted_fields: Document,
    },
    /// A document was inserted.
    DocumentInserted {
        /// Collection
        namespace: Namespace,
        /// Assigned `_id`
        id: Value,
    },
    /// A validator was installed.
    ValidatorInstalled {
        /// Collection
        namespace: Namespace,
    },
    /// A document was read back.
    DocumentFetched {
        /// Collection
        namespace: Namespace,
        /// Session that read it
        session: SessionKind,
        /// Query document
        filter: Document,
        /// The document, if one matched
        document: Option<Document>,
    },
}

impl Event {
    /// Short machine-readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::StepSucceeded { .. } => "step_succeeded",
            Self::StepFailed { .. } => "step_failed",
            Self::Connected { .. } => "connected",
            Self::Closed { .. } => "closed",
            Self::KeysDeleted { .. } => "keys_deleted",
            Self::IndexCreated { .. } => "index_created",
            Self::DataKeyCreated { .. } => "data_key_created",
            Self::KeyResolved { .. } => "key_resolved",
            Self::KeyAltNameAdded { .. } => "key_alt_name_added",
            Self::FieldsDeclared { .. } => "fields_declared",
            Self::CollectionDropped { .. } => "collection_dropped",
            Self::DatabaseDropped { .. } => "database_dropped",
            Self::EncryptedCollectionCreated { .. } => "encrypted_collection_created",
            Self::DocumentInserted { .. } => "document_inserted",
            Self::ValidatorInstalled { .. } => "validator_installed",
            Self::DocumentFetched { .. } => "document_fetched",
        }
    }

    /// Verbosity of the event.
    #[must_use]
    pub const fn level(&self) -> Level {
        match self {
            Self::StepStarted { .. } | Self::StepSucceeded { .. } => Level::Debug,
            Self::StepFailed { expected: false, .. } => Level::Warn,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepStarted { name } => write!(f, "{name}..."),
            Self::StepSucceeded { name } => write!(f, "{name}: done"),
            Self::StepFailed { name, error, expected: true } => {
                write!(f, "{name}: failed as expected: {error}")
            }
            Self::StepFailed { name, error, expected: false } => write!(f, "{name}: {error}"),
            Self::Connected { uri, encrypted: true } => write!(f, "opened encrypted connection to {uri}"),
            Self::Connected { uri, encrypted: false } => write!(f, "opened connection to {uri}"),
            Self::Closed { uri } => write!(f, "closed connection to {uri}"),
            Self::KeysDeleted { pattern, count } => {
                write!(f, "removed {count} key(s) matching /{pattern}/")
            }
            Self::IndexCreated { namespace, name } => write!(f, "created index {name} on {namespace}"),
            Self::DataKeyCreated { key_id, alt_name: Some(alt) } => {
                write!(f, "created data key {key_id} ({alt})")
            }
            Self::DataKeyCreated { key_id, alt_name: None } => write!(f, "created data key {key_id}"),
            Self::KeyResolved { alt_name, key_id } => write!(f, "{alt_name} -> {key_id}"),
            Self::KeyAltNameAdded { key_id, alt_name } => {
                write!(f, "tagged data key {key_id} as {alt_name}")
            }
            Self::FieldsDeclared { namespace, declaration } => {
                write!(f, "encrypted fields of {namespace}:\n{}", declaration.to_pretty_json())
            }
            Self::CollectionDropped { namespace } => write!(f, "dropped {namespace}"),
            Self::DatabaseDropped { database } => write!(f, "dropped database {database}"),
            Self::EncryptedCollectionCreated { namespace, encrypted_fields } => write!(
                f,
                "created encrypted collection {namespace}:\n{}",
                encrypted_fields.to_pretty_json()
            ),
            Self::DocumentInserted { namespace, id } => write!(f, "inserted {id} into {namespace}"),
            Self::ValidatorInstalled { namespace } => write!(f, "installed validator on {namespace}"),
            Self::DocumentFetched { namespace, session, filter, document: Some(doc) } => write!(
                f,
                "{session} session, {namespace} {filter}:\n{}",
                doc.to_pretty_json()
            ),
            Self::DocumentFetched { namespace, session, filter, document: None } => {
                write!(f, "{session} session, {namespace} {filter}: no match")
            }
        }
    }
}

/// Receives events from a running flow.
pub trait Observer: Send + Sync {
    /// Called once per event, in order.
    fn on_event(&self, event: &Event);
}

/// Discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        let name = event.name();
        match event.level() {
            Level::Debug => debug!(event = name, "{event}"),
            Level::Info => info!(event = name, "{event}"),
            Level::Warn => warn!(event = name, "{event}"),
        }
    }
}

/// Keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Documents read by a given kind of session.
    #[must_use]
    pub fn fetched(&self, session: SessionKind) -> Vec<Document> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::DocumentFetched { session: s, document: Some(doc), .. } if *s == session => {
                    Some(doc.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
