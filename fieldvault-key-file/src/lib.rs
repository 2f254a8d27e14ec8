//! Local master key provider for `fieldvault`.
//!
//! The master key is a 96-byte secret kept in a file, either as raw bytes or
//! as base64 text. Data keys are wrapped with ChaCha20-Poly1305 under a
//! wrapping key derived from the master key:
//!
//! ```text
//! wrapped = nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! Suitable for development and testing only: anyone who can read the key
//! file can decrypt every field.

#![warn(clippy::pedantic, clippy::nursery)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use fieldvault::error::KeyProviderError;
use fieldvault::kdf::{derive_subkey, KeyPurpose};
use fieldvault::key_provider::KeyProvider;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use tracing::debug;
use zeroize::Zeroizing;

/// Master key size in bytes.
pub const MASTER_KEY_SIZE: usize = 96;

const NONCE_SIZE: usize = 12;
const PROVIDER_NAME: &str = "local";
const WRAP_AAD: &[u8] = b"fieldvault/local/dek";

/// How [`generate_key_file`] writes the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// 96 raw bytes
    #[default]
    Raw,
    /// Base64 text, no trailing newline
    Base64,
}

/// Key provider backed by a local master key file.
pub struct LocalKeyProvider {
    path: Option<PathBuf>,
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for LocalKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyProvider").field("path", &self.path).finish_non_exhaustive()
    }
}

impl LocalKeyProvider {
    /// Loads the master key from a file.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::MasterKeyNotFound` if the file does not
    /// exist and `KeyProviderError::InvalidMasterKey` if it holds neither 96
    /// raw bytes nor base64 text decoding to 96 bytes.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let path = path.into();
        if !path.exists() {
            return Err(KeyProviderError::MasterKeyNotFound(path));
        }
        let contents = Zeroizing::new(fs::read(&path)?);
        let master_key = decode_master_key(&contents)?;
        debug!(path = %path.display(), "loaded local master key");

        let mut provider = Self::from_master_key(&master_key)?;
        provider.path = Some(path);
        Ok(provider)
    }

    /// Builds a provider from master key bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::InvalidMasterKey` if the key is not 96
    /// bytes long.
    pub fn from_master_key(master_key: &SecretVec<u8>) -> Result<Self, KeyProviderError> {
        let len = master_key.expose_secret().len();
        if len != MASTER_KEY_SIZE {
            return Err(KeyProviderError::InvalidMasterKey(format!(
                "expected {MASTER_KEY_SIZE} bytes, got {len}"
            )));
        }
        let wrap_key = derive_subkey(master_key, KeyPurpose::Wrap)
            .map_err(|e| KeyProviderError::InvalidMasterKey(e.to_string()))?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_key.expose_secret()));
        Ok(Self { path: None, cipher })
    }

    /// File the master key was loaded from.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl KeyProvider for LocalKeyProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn wrap_dek(&self, dek: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: dek, aad: WRAP_AAD })
            .map_err(|e| KeyProviderError::WrapFailed(e.to_string()))?;

        let mut wrapped = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&ciphertext);
        Ok(wrapped)
    }

    fn unwrap_dek(&self, wrapped_dek: &[u8]) -> Result<SecretVec<u8>, KeyProviderError> {
        if wrapped_dek.len() <= NONCE_SIZE {
            return Err(KeyProviderError::UnwrapFailed("wrapped key too short".to_string()));
        }
        let (nonce, ciphertext) = wrapped_dek.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: WRAP_AAD })
            .map(SecretVec::new)
            .map_err(|_| {
                KeyProviderError::UnwrapFailed("key material does not match this master key".to_string())
            })
    }
}

/// Accepts 96 raw bytes or base64 text (surrounding whitespace ignored).
fn decode_master_key(contents: &[u8]) -> Result<SecretVec<u8>, KeyProviderError> {
    if contents.len() == MASTER_KEY_SIZE {
        return Ok(SecretVec::new(contents.to_vec()));
    }

    let text = std::str::from_utf8(contents)
        .map_err(|_| KeyProviderError::InvalidMasterKey(format!("expected {MASTER_KEY_SIZE} raw bytes or base64 text")))?;
    let decoded = Zeroizing::new(
        STANDARD
            .decode(text.trim())
            .map_err(|e| KeyProviderError::InvalidMasterKey(format!("invalid base64: {e}")))?,
    );
    if decoded.len() != MASTER_KEY_SIZE {
        return Err(KeyProviderError::InvalidMasterKey(format!(
            "base64 key decodes to {} bytes, expected {MASTER_KEY_SIZE}",
            decoded.len()
        )));
    }
    Ok(SecretVec::new(decoded.to_vec()))
}

/// Writes a fresh random master key to `path`.
///
/// The file must not exist yet. On Unix it is created with mode `0600`.
///
/// # Errors
///
/// Returns `KeyProviderError::Io` if the file exists or cannot be written.
pub fn generate_key_file(path: impl AsRef<Path>, encoding: KeyEncoding) -> Result<(), KeyProviderError> {
    let path = path.as_ref();
    let mut key = Zeroizing::new(vec![0u8; MASTER_KEY_SIZE]);
    rand::thread_rng().fill_bytes(&mut key);

    let contents = match encoding {
        KeyEncoding::Raw => key,
        KeyEncoding::Base64 => Zeroizing::new(STANDARD.encode(key.as_slice()).into_bytes()),
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(&contents)?;
    file.sync_all()?;

    debug!(path = %path.display(), ?encoding, "wrote master key file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master-key.txt");
        generate_key_file(&path, KeyEncoding::Raw).unwrap();

        let provider = LocalKeyProvider::open(&path).unwrap();
        let dek = [7u8; 96];
        let wrapped = provider.wrap_dek(&dek).unwrap();
        assert_ne!(&wrapped[NONCE_SIZE..NONCE_SIZE + 96], &dek[..]);

        let unwrapped = provider.unwrap_dek(&wrapped).unwrap();
        assert_eq!(unwrapped.expose_secret().as_slice(), &dek[..]);
        assert_eq!(provider.path(), Some(path.as_path()));
    }

    #[test]
    fn test_base64_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master-key.txt");
        generate_key_file(&path, KeyEncoding::Base64).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.len(), 128);
        fs::write(&path, format!("{text}\n")).unwrap();
        assert!(LocalKeyProvider::open(&path).is_ok());
    }

    #[test]
    fn test_missing_key_file() {
        let dir = TempDir::new().unwrap();
        let err = LocalKeyProvider::open(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, KeyProviderError::MasterKeyNotFound(_)));
    }

    #[test]
    fn test_malformed_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master-key.txt");
        fs::write(&path, "too short").unwrap();
        assert!(matches!(LocalKeyProvider::open(&path), Err(KeyProviderError::InvalidMasterKey(_))));

        fs::write(&path, STANDARD.encode([1u8; 32])).unwrap();
        assert!(matches!(LocalKeyProvider::open(&path), Err(KeyProviderError::InvalidMasterKey(_))));
    }

    #[test]
    fn test_other_master_key_cannot_unwrap() {
        let a = LocalKeyProvider::from_master_key(&SecretVec::new(vec![1; 96])).unwrap();
        let b = LocalKeyProvider::from_master_key(&SecretVec::new(vec![2; 96])).unwrap();
        let wrapped = a.wrap_dek(&[3; 96]).unwrap();
        assert!(matches!(b.unwrap_dek(&wrapped), Err(KeyProviderError::UnwrapFailed(_))));
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master-key.txt");
        generate_key_file(&path, KeyEncoding::Raw).unwrap();
        assert!(matches!(generate_key_file(&path, KeyEncoding::Raw), Err(KeyProviderError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master-key.txt");
        generate_key_file(&path, KeyEncoding::Raw).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
