//! Sample records written by the flows.

use crate::value::{utc_date, Document, Value};

fn person(
    name: &str,
    ssn: &str,
    dob: (i32, u32, u32),
    num: i64,
    n: i64,
    secret: &str,
    contacts: Document,
) -> Document {
    let pair = || Value::from(Document::new().with("foo", n).with("bar", n + 1));
    Document::new()
        .with("name", name)
        .with("ssn", ssn)
        .with("dob", utc_date(dob.0, dob.1, dob.2))
        .with("object_data", Document::new().with("record", 1).with("num", num))
        .with("array_data", vec![pair(), Value::from(secret)])
        .with("unenc_data", vec![pair(), Value::from(format!("not{secret}"))])
        .with("contacts", contacts)
}

fn contacts(address1: &str, city: &str, state: &str, postal: &str, mobile: &str) -> Document {
    Document::new()
        .with("address1", address1)
        .with("city", city)
        .with("state", state)
        .with("postal", postal)
        .with("mobile", mobile)
}

/// Taylor, born 1989-12-13, ssn `555-55-5555`.
#[must_use]
pub fn taylor() -> Document {
    person(
        "Taylor",
        "555-55-5555",
        (1989, 12, 13),
        12_345_678,
        1,
        "secret",
        contacts("123 Main St", "New York", "NY", "10281", "212-867-5309"),
    )
}

/// Thomas, born 1960-11-06, ssn `290-66-1234`.
#[must_use]
pub fn thomas() -> Document {
    person(
        "Thomas",
        "290-66-1234",
        (1960, 11, 6),
        87_654_321,
        2,
        "secret2",
        contacts("6293 Girvin Dr", "Oakland", "CA", "94611", "919-360-4368"),
    )
}

/// Taylor with the free-text `comment` of the queryable-encryption flow.
#[must_use]
pub fn taylor_with_comment() -> Document {
    taylor().with("comment", "random thing said by Taylor")
}

/// Thomas with the free-text `comment` of the queryable-encryption flow.
#[must_use]
pub fn thomas_with_comment() -> Document {
    thomas().with("comment", "This is string to search on mongodb employee")
}
