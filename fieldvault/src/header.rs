//! Encrypted payload header format.
//!
//! Every encrypted field value is stored as a binary value of subtype 6
//! whose bytes start with this header:
//! - Encryption mode (blob subtype)
//! - Data key identifier
//! - Original value type
//! - Nonce (empty for deterministic payloads)

use crate::algorithm::EncryptionMode;
use crate::error::Error;
use crate::key_vault::KeyId;
use crate::value::ValueType;

/// Size of a serialized key id.
const KEY_ID_LEN: usize = 16;

/// Header of an encrypted payload.
///
/// Format:
/// ```text
/// [blob_subtype:1][key_id:16][value_type:1][nonce_len:1][nonce:L]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    mode: EncryptionMode,
    key_id: KeyId,
    value_type: ValueType,
    nonce: Vec<u8>,
}

impl PayloadHeader {
    /// Creates a new payload header.
    ///
    /// # Arguments
    ///
    /// * `mode` - Encryption mode of the payload
    /// * `key_id` - Data key that encrypted the payload
    /// * `value_type` - Type of the plaintext value
    /// * `nonce` - AEAD nonce, empty for deterministic payloads
    #[must_use]
    pub const fn new(
        mode: EncryptionMode,
        key_id: KeyId,
        value_type: ValueType,
        nonce: Vec<u8>,
    ) -> Self {
        Self { mode, key_id, value_type, nonce }
    }

    /// Returns the encryption mode.
    #[must_use]
    pub const fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Returns the data key identifier.
    #[must_use]
    pub const fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Returns the plaintext type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Serializes the header to bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the nonce is longer than 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.nonce.len() > 255 {
            return Err(Error::InvalidHeader(format!(
                "Nonce too long: {} bytes (max: 255)",
                self.nonce.len()
            )));
        }

        let mut bytes = Vec::with_capacity(3 + KEY_ID_LEN + self.nonce.len());
        bytes.push(self.mode.blob_subtype());
        bytes.extend_from_slice(self.key_id.as_bytes());
        bytes.push(self.value_type.code());

        // Safe cast: length validated above, max 255
        #[allow(clippy::cast_possible_truncation)]
        let nonce_len = self.nonce.len() as u8;
        bytes.push(nonce_len);
        bytes.extend_from_slice(&self.nonce);

        Ok(bytes)
    }

    /// Deserializes a header from bytes.
    ///
    /// Returns the header and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The data is too short
    /// - The blob subtype or value type is unknown
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), Error> {
        let Some(&subtype) = data.first() else {
            return Err(Error::InvalidHeader("Empty payload".to_string()));
        };
        let mode = EncryptionMode::from_blob_subtype(subtype)
            .ok_or_else(|| Error::InvalidHeader(format!("Unknown blob subtype: {subtype}")))?;
        let mut pos = 1;

        if pos + KEY_ID_LEN > data.len() {
            return Err(Error::InvalidHeader("Key id truncated".to_string()));
        }
        let mut key_bytes = [0u8; KEY_ID_LEN];
        key_bytes.copy_from_slice(&data[pos..pos + KEY_ID_LEN]);
        let key_id = KeyId::from_bytes(key_bytes);
        pos += KEY_ID_LEN;

        let Some(&type_code) = data.get(pos) else {
            return Err(Error::InvalidHeader("Missing value type".to_string()));
        };
        let value_type = ValueType::from_code(type_code)
            .ok_or_else(|| Error::InvalidHeader(format!("Unknown value type: {type_code:#04x}")))?;
        pos += 1;

        let Some(&nonce_len) = data.get(pos) else {
            return Err(Error::InvalidHeader("Missing nonce length".to_string()));
        };
        let nonce_len = nonce_len as usize;
        pos += 1;

        if pos + nonce_len > data.len() {
            return Err(Error::InvalidHeader("Nonce truncated".to_string()));
        }
        let nonce = data[pos..pos + nonce_len].to_vec();
        pos += nonce_len;

        Ok((Self { mode, key_id, value_type, nonce }, pos))
    }
}
