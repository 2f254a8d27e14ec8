//! Encryption algorithms and per-field encryption modes.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Algorithm named in a CSFLE `encrypt` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Same plaintext and key always give the same ciphertext.
    Deterministic,
    /// Every encryption call gives a fresh ciphertext.
    Random,
}

impl Algorithm {
    /// Wire name used in schema maps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deterministic => "AEAD_AES_256_CBC_HMAC_SHA_512-Deterministic",
            Self::Random => "AEAD_AES_256_CBC_HMAC_SHA_512-Random",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AEAD_AES_256_CBC_HMAC_SHA_512-Deterministic" => Ok(Self::Deterministic),
            "AEAD_AES_256_CBC_HMAC_SHA_512-Random" => Ok(Self::Random),
            other => Err(Error::InvalidDeclaration(format!("unknown algorithm '{other}'"))),
        }
    }
}

/// Query support requested for a queryable-encryption field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Exact-match lookups.
    Equality,
}

impl QueryType {
    /// Wire name used in `queries` clauses.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Equality => "equality",
        }
    }
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equality" => Ok(Self::Equality),
            other => Err(Error::InvalidDeclaration(format!("unsupported queryType '{other}'"))),
        }
    }
}

/// How a declared field is encrypted, stored as the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionMode {
    /// CSFLE deterministic; equality by ciphertext comparison.
    Deterministic,
    /// CSFLE randomized; not queryable.
    Random,
    /// Queryable encryption with equality tags in `__safeContent__`.
    Indexed,
    /// Queryable encryption without query support.
    Unindexed,
}

impl EncryptionMode {
    /// Payload subtype byte.
    #[must_use]
    pub const fn blob_subtype(self) -> u8 {
        match self {
            Self::Deterministic => 1,
            Self::Random => 2,
            Self::Indexed => 3,
            Self::Unindexed => 4,
        }
    }

    /// Inverse of [`EncryptionMode::blob_subtype`].
    #[must_use]
    pub const fn from_blob_subtype(subtype: u8) -> Option<Self> {
        match subtype {
            1 => Some(Self::Deterministic),
            2 => Some(Self::Random),
            3 => Some(Self::Indexed),
            4 => Some(Self::Unindexed),
            _ => None,
        }
    }

    /// Underlying AEAD behaviour.
    #[must_use]
    pub const fn algorithm(self) -> Algorithm {
        match self {
            Self::Deterministic => Algorithm::Deterministic,
            Self::Random | Self::Indexed | Self::Unindexed => Algorithm::Random,
        }
    }

    /// Whether equality filters on this field can be answered.
    #[must_use]
    pub const fn supports_equality(self) -> bool {
        matches!(self, Self::Deterministic | Self::Indexed)
    }
}

impl From<Algorithm> for EncryptionMode {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Deterministic => Self::Deterministic,
            Algorithm::Random => Self::Random,
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deterministic => "deterministic",
            Self::Random => "random",
            Self::Indexed => "indexed",
            Self::Unindexed => "unindexed",
        };
        f.write_str(name)
    }
}
