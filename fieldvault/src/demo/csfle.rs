//! Client-side field level encryption, in two runs.
//!
//! [`create_vault`] provisions one data key per encrypted field.
//! [`create_data`] builds the schema map from those keys, writes the sample
//! records through an encrypted session and reads them back through both an
//! encrypted and a plain session.

use std::sync::Arc;

use crate::config::{Credentials, DemoConfig};
use crate::driver::{Driver, Policy, RunReport};
use crate::event::{Event, Observer, SessionKind};
use crate::key_provider::KeyProvider;
use crate::key_vault::{KeyId, KeyVault};
use crate::schema::{EncryptSpec, JsonSchema, SchemaMap};
use crate::session::{AutoEncryptionOptions, Client, EncryptedClient};
use crate::value::{Document, ValueType};

use super::sample;

/// Fields that get a data key, by the name used in their alternate name.
pub const KEY_FIELDS: [&str; 5] = ["ssn", "dob", "mobile", "object_data", "array_data"];

/// Result of [`create_vault`].
#[derive(Debug, Clone)]
pub struct VaultOutcome {
    /// Step outcomes
    pub report: RunReport,
    /// Created keys by alternate name
    pub keys: Vec<(String, KeyId)>,
}

/// Result of [`create_data`].
#[derive(Debug, Clone)]
pub struct DataOutcome {
    /// Step outcomes
    pub report: RunReport,
    /// Schema map used by the encrypted session
    pub schema_map: Option<SchemaMap>,
    /// Thomas as read through the encrypted session, by ssn
    pub encrypted_read: Option<Document>,
    /// Thomas as read through the plain session, by name
    pub plain_read: Option<Document>,
}

/// Resets the key vault and creates the data keys of the sample collection.
#[must_use]
pub fn create_vault(
    config: &DemoConfig,
    credentials: &Credentials,
    provider: Arc<dyn KeyProvider>,
    observer: &dyn Observer,
) -> VaultOutcome {
    let mut driver = Driver::new(observer);
    let mut keys = Vec::new();

    let Some(vault) = driver.step("connect", Policy::Abort, || {
        let client = Client::connect(&credentials.uri)?;
        let vault = KeyVault::new(
            Arc::clone(client.store()?),
            config.key_vault_namespace()?,
            Arc::clone(&provider),
        );
        Ok((client, vault))
    }) else {
        return VaultOutcome { report: driver.finish(), keys };
    };
    let (client, vault) = vault;
    driver.emit(Event::Connected { uri: credentials.uri.clone(), encrypted: false });

    let pattern = config.reset_pattern();
    if let Some(count) =
        driver.step("delete old keys", Policy::Abort, || vault.delete_keys_matching(&pattern))
    {
        driver.emit(Event::KeysDeleted { pattern, count });
    }

    if let Some(name) =
        driver.step("create key vault index", Policy::Abort, || vault.ensure_alt_name_index())
    {
        driver.emit(Event::IndexCreated { namespace: vault.namespace().clone(), name });
    }

    for field in KEY_FIELDS {
        let alt_name = config.alt_name(field);
        let step = format!("create data key {alt_name}");
        let created = driver.step(&step, Policy::Abort, || {
            vault.create_data_key(std::slice::from_ref(&alt_name))
        });
        if let Some(key_id) = created {
            driver.emit(Event::DataKeyCreated { key_id, alt_name: Some(alt_name.clone()) });
            keys.push((alt_name, key_id));
        }
    }

    driver.step("close", Policy::Abort, || {
        client.close();
        Ok(())
    });
    if !driver.is_halted() {
        driver.emit(Event::Closed { uri: credentials.uri.clone() });
    }

    VaultOutcome { report: driver.finish(), keys }
}

fn finish(driver: Driver<'_>, mut outcome: DataOutcome) -> DataOutcome {
    outcome.report = driver.finish();
    outcome
}

/// CSFLE schema of the sample collection.
///
/// `keys` are the data keys of [`KEY_FIELDS`], in the same order.
#[must_use]
pub fn people_schema(keys: &[KeyId; 5]) -> JsonSchema {
    let [ssn, dob, mobile, object_data, array_data] = *keys;
    JsonSchema::object()
        .encrypt("ssn", EncryptSpec::deterministic(ValueType::String, ssn))
        .encrypt("dob", EncryptSpec::deterministic(ValueType::Date, dob))
        .encrypt("object_data", EncryptSpec::random(ValueType::Object, object_data))
        .encrypt("array_data", EncryptSpec::random(ValueType::Array, array_data))
        .property(
            "contacts",
            JsonSchema::object().encrypt("mobile", EncryptSpec::random(ValueType::String, mobile)),
        )
}

/// Writes and reads the sample records with automatic encryption.
///
/// Expects the keys of [`create_vault`] to exist; a missing key halts the
/// run.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn create_data(
    config: &DemoConfig,
    credentials: &Credentials,
    provider: Arc<dyn KeyProvider>,
    observer: &dyn Observer,
) -> DataOutcome {
    let mut driver = Driver::new(observer);
    let mut outcome = DataOutcome {
        report: RunReport::default(),
        schema_map: None,
        encrypted_read: None,
        plain_read: None,
    };

    // Resolve key ids through a plain session
    let Some((client, vault)) = driver.step("connect", Policy::Abort, || {
        let client = Client::connect(&credentials.uri)?;
        let vault = KeyVault::new(
            Arc::clone(client.store()?),
            config.key_vault_namespace()?,
            Arc::clone(&provider),
        );
        Ok((client, vault))
    }) else {
        return finish(driver, outcome);
    };
    driver.emit(Event::Connected { uri: credentials.uri.clone(), encrypted: false });

    let mut key_ids = Vec::with_capacity(KEY_FIELDS.len());
    for field in KEY_FIELDS {
        let alt_name = config.alt_name(field);
        let step = format!("resolve key {alt_name}");
        let Some(key_id) = driver.step(&step, Policy::Abort, || vault.key_id_for_alt_name(&alt_name))
        else {
            return finish(driver, outcome);
        };
        driver.emit(Event::KeyResolved { alt_name, key_id });
        key_ids.push(key_id);
    }
    let Ok(key_ids) = <[KeyId; 5]>::try_from(key_ids) else {
        return finish(driver, outcome);
    };

    let Some(namespace) = driver.step("declare schema", Policy::Abort, || config.data_namespace())
    else {
        return finish(driver, outcome);
    };
    let schema = people_schema(&key_ids);
    let schema_map = SchemaMap::new().with(namespace.clone(), schema.clone());
    driver.emit(Event::FieldsDeclared {
        namespace: namespace.clone(),
        declaration: schema_map.to_document(),
    });
    outcome.schema_map = Some(schema_map.clone());

    client.close();
    driver.emit(Event::Closed { uri: credentials.uri.clone() });

    let Some(encrypted) = driver.step("connect encrypted", Policy::Abort, || {
        let options = AutoEncryptionOptions::new(vault.namespace().clone(), Arc::clone(&provider))
            .with_schema_map(schema_map)
            .with_crypt_shared_lib_path(credentials.shared_lib_path.clone());
        EncryptedClient::connect(&credentials.uri, options)
    }) else {
        return finish(driver, outcome);
    };
    driver.emit(Event::Connected { uri: credentials.uri.clone(), encrypted: true });

    let database = encrypted.database(namespace.database());
    let Some(people) =
        driver.step("open collection", Policy::Abort, || database.collection(namespace.collection()))
    else {
        return finish(driver, outcome);
    };

    if driver.step("drop collection", Policy::Continue, || people.drop()).is_some() {
        driver.emit(Event::CollectionDropped { namespace: namespace.clone() });
    }

    for (step, record) in [("insert Taylor", sample::taylor()), ("insert Thomas", sample::thomas())] {
        if let Some(id) = driver.step(step, Policy::Continue, || people.insert_one(record)) {
            driver.emit(Event::DocumentInserted { namespace: namespace.clone(), id });
        }
    }

    let installed = driver.step("install validator", Policy::Continue, || {
        database.run_coll_mod(namespace.collection(), schema.to_validator())
    });
    if installed.is_some() {
        driver.emit(Event::ValidatorInstalled { namespace: namespace.clone() });
    }

    let by_ssn = Document::new().with("ssn", "290-66-1234");
    if let Some(found) = driver.step("find by ssn", Policy::Continue, || people.find_one(&by_ssn)) {
        driver.emit(Event::DocumentFetched {
            namespace: namespace.clone(),
            session: SessionKind::Encrypted,
            filter: by_ssn,
            document: found.clone(),
        });
        outcome.encrypted_read = found;
    }

    encrypted.close();
    driver.emit(Event::Closed { uri: credentials.uri.clone() });

    let Some(plain) = driver.step("connect plain", Policy::Abort, || {
        let client = Client::connect(&credentials.uri)?;
        let people = client.database(namespace.database()).collection(namespace.collection())?;
        Ok((client, people))
    }) else {
        return finish(driver, outcome);
    };
    let (plain_client, plain_people) = plain;
    driver.emit(Event::Connected { uri: credentials.uri.clone(), encrypted: false });

    let by_name = Document::new().with("name", "Thomas");
    if let Some(found) = driver.step("find by name", Policy::Continue, || plain_people.find_one(&by_name))
    {
        driver.emit(Event::DocumentFetched {
            namespace: namespace.clone(),
            session: SessionKind::Plain,
            filter: by_name,
            document: found.clone(),
        });
        outcome.plain_read = found;
    }

    // The validator only accepts ciphertext at encrypted paths
    driver.step("insert plaintext", Policy::ExpectFailure, || {
        plain_people.insert_one(sample::taylor())
    });

    plain_client.close();
    driver.emit(Event::Closed { uri: credentials.uri.clone() });

    finish(driver, outcome)
}
