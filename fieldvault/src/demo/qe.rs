//! Queryable encryption, in one run.
//!
//! The encrypted fields are fixed when the collection is created; data keys
//! for them are generated on the fly and tagged afterwards so a later run
//! can remove them.

use std::sync::Arc;

use crate::algorithm::QueryType;
use crate::config::{Credentials, DemoConfig};
use crate::driver::{Driver, Policy, RunReport};
use crate::event::{Event, Observer, SessionKind};
use crate::key_provider::KeyProvider;
use crate::schema::{EncryptedField, EncryptedFields};
use crate::session::{AutoEncryptionOptions, Client, EncryptedClient};
use crate::value::{Document, ValueType};

use super::sample;

/// Result of [`hello_world`].
#[derive(Debug, Clone)]
pub struct QeOutcome {
    /// Step outcomes
    pub report: RunReport,
    /// Field list with the generated key ids
    pub encrypted_fields: Option<EncryptedFields>,
    /// Thomas as read through the encrypted session, by ssn
    pub encrypted_read: Option<Document>,
    /// Thomas as read through the plain session, by name
    pub plain_read: Option<Document>,
}

impl QeOutcome {
    fn finish(mut self, driver: Driver<'_>) -> Self {
        self.report = driver.finish();
        self
    }
}

/// Encrypted fields of the sample collection. Only `ssn`, `dob` and
/// `contacts.mobile` are searchable.
#[must_use]
pub fn people_fields() -> EncryptedFields {
    EncryptedFields::new()
        .field(EncryptedField::new("ssn", ValueType::String).queryable(QueryType::Equality))
        .field(EncryptedField::new("dob", ValueType::Date).queryable(QueryType::Equality))
        .field(EncryptedField::new("contacts.mobile", ValueType::String).queryable(QueryType::Equality))
        .field(EncryptedField::new("object_data", ValueType::Object))
        .field(EncryptedField::new("array_data", ValueType::Array))
}

/// Creates an encrypted collection, writes the sample records and reads
/// them back through both kinds of session.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn hello_world(
    config: &DemoConfig,
    credentials: &Credentials,
    provider: Arc<dyn KeyProvider>,
    observer: &dyn Observer,
) -> QeOutcome {
    let mut driver = Driver::new(observer);
    let mut outcome = QeOutcome {
        report: RunReport::default(),
        encrypted_fields: None,
        encrypted_read: None,
        plain_read: None,
    };

    let Some((client, namespace)) = driver.step("connect encrypted", Policy::Abort, || {
        let options = AutoEncryptionOptions::new(config.key_vault_namespace()?, provider)
            .with_crypt_shared_lib_path(credentials.shared_lib_path.clone());
        Ok((EncryptedClient::connect(&credentials.uri, options)?, config.data_namespace()?))
    }) else {
        return outcome.finish(driver);
    };
    driver.emit(Event::Connected { uri: credentials.uri.clone(), encrypted: true });

    let encryption = client.client_encryption();
    let vault = encryption.key_vault();
    let database = client.database(namespace.database());

    if driver.step("drop database", Policy::Continue, || database.drop()).is_some() {
        driver.emit(Event::DatabaseDropped { database: database.name().to_string() });
    }

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

    let Some((people, fields)) = driver.step("create encrypted collection", Policy::Abort, || {
        encryption.create_encrypted_collection(&database, namespace.collection(), people_fields())
    }) else {
        return outcome.finish(driver);
    };
    driver.emit(Event::EncryptedCollectionCreated {
        namespace: namespace.clone(),
        encrypted_fields: fields.to_document(),
    });

    for field in &fields.fields {
        let Some(key_id) = field.key_id else { continue };
        let alt_name = format!("{}-autogenerated", config.alt_name(&field.path));
        let step = format!("tag key {alt_name}");
        if driver.step(&step, Policy::Continue, || encryption.add_key_alt_name(key_id, &alt_name)).is_some()
        {
            driver.emit(Event::KeyAltNameAdded { key_id, alt_name });
        }
    }
    outcome.encrypted_fields = Some(fields);

    let records = [
        ("insert Taylor", sample::taylor_with_comment()),
        ("insert Thomas", sample::thomas_with_comment()),
    ];
    for (step, record) in records {
        if let Some(id) = driver.step(step, Policy::Continue, || people.insert_one(record)) {
            driver.emit(Event::DocumentInserted { namespace: namespace.clone(), id });
        }
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

    let Some((plain_client, plain_people)) = driver.step("connect plain", Policy::Abort, || {
        let plain = Client::connect(&credentials.uri)?;
        let people = plain.database(namespace.database()).collection(namespace.collection())?;
        Ok((plain, people))
    }) else {
        return outcome.finish(driver);
    };
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

    // object_data has no queries clause
    let by_object = Document::new()
        .with("object_data", Document::new().with("record", 1).with("num", 87_654_321));
    driver.step("query unindexed field", Policy::ExpectFailure, || people.find_one(&by_object));

    // encryptedFields paths only accept ciphertext
    driver.step("insert plaintext", Policy::ExpectFailure, || plain_people.insert_one(sample::taylor()));

    client.close();
    plain_client.close();
    driver.emit(Event::Closed { uri: credentials.uri.clone() });

    outcome.finish(driver)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretVec;

    use super::*;
    use crate::driver::StepOutcome;
    use crate::error::KeyProviderError;
    use crate::event::NoopObserver;
    use crate::value::Value;

    struct PlainProvider;

    impl KeyProvider for PlainProvider {
        fn provider_name(&self) -> &str {
            "local"
        }

        fn wrap_dek(&self, dek: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
            Ok(dek.to_vec())
        }

        fn unwrap_dek(&self, wrapped: &[u8]) -> Result<SecretVec<u8>, KeyProviderError> {
            Ok(SecretVec::new(wrapped.to_vec()))
        }
    }

    #[test]
    fn test_hello_world() {
        let credentials = Credentials::new(format!("memory://qe-{}", uuid::Uuid::new_v4()));
        let outcome = hello_world(&DemoConfig::qe(), &credentials, Arc::new(PlainProvider), &NoopObserver);

        assert!(outcome.report.is_complete(), "{:?}", outcome.report);
        assert_eq!(outcome.report.problems().count(), 0, "{:?}", outcome.report);

        let fields = outcome.encrypted_fields.unwrap();
        assert_eq!(fields.fields.len(), 5);
        assert!(fields.fields.iter().all(|f| f.key_id.is_some()));

        let encrypted = outcome.encrypted_read.unwrap();
        assert_eq!(encrypted.get_str("name"), Some("Thomas"));
        assert_eq!(encrypted.get_str("comment"), Some("This is string to search on mongodb employee"));
        assert!(!encrypted.get_array("__safeContent__").unwrap_or_default().is_empty());

        let plain = outcome.plain_read.unwrap();
        assert!(plain.get("ssn").is_some_and(Value::is_encrypted));
        assert!(plain.get_path("contacts.mobile").is_some_and(Value::is_encrypted));
        assert_eq!(plain.get_str("comment"), Some("This is string to search on mongodb employee"));

        assert!(matches!(
            outcome.report.step("query unindexed field").unwrap().outcome,
            StepOutcome::ExpectedFailure { .. }
        ));
        assert!(matches!(
            outcome.report.step("insert plaintext").unwrap().outcome,
            StepOutcome::ExpectedFailure { .. }
        ));
    }

    #[test]
    fn test_rerun_replaces_tagged_keys() {
        let credentials = Credentials::new(format!("memory://qe-{}", uuid::Uuid::new_v4()));
        let first = hello_world(&DemoConfig::qe(), &credentials, Arc::new(PlainProvider), &NoopObserver);
        let second = hello_world(&DemoConfig::qe(), &credentials, Arc::new(PlainProvider), &NoopObserver);
        assert!(first.report.is_complete());
        assert!(second.report.is_complete());
        assert_eq!(second.report.problems().count(), 0, "{:?}", second.report);

        let deleted = second
            .report
            .step("delete old keys")
            .map(|s| s.outcome.clone());
        assert_eq!(deleted, Some(StepOutcome::Succeeded));
    }
}
