//! Key provider abstraction for master-key operations.

use secrecy::SecretVec;

use crate::error::KeyProviderError;
use crate::value::Document;

/// Wraps and unwraps data encryption keys under a master key.
///
/// Implementations must be thread-safe (`Send + Sync`) so one provider can
/// back both the key vault and every encrypted session that reads from it.
///
/// # Example
///
/// ```rust,ignore
/// use fieldvault::key_provider::KeyProvider;
///
/// struct MyProvider;
///
/// impl KeyProvider for MyProvider {
///     fn provider_name(&self) -> &str {
///         "local"
///     }
///     // ... other methods
/// }
/// ```
pub trait KeyProvider: Send + Sync {
    /// Name stored under `masterKey.provider` in data key records.
    fn provider_name(&self) -> &str;

    /// Master key descriptor stored with each data key.
    fn master_key(&self) -> Document {
        Document::new().with("provider", self.provider_name())
    }

    /// Wraps (encrypts) a plaintext data encryption key.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::WrapFailed` if wrapping fails.
    fn wrap_dek(&self, dek: &[u8]) -> Result<Vec<u8>, KeyProviderError>;

    /// Unwraps (decrypts) a data encryption key.
    ///
    /// # Returns
    ///
    /// Returns the plaintext DEK in a `SecretVec` for memory safety.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::UnwrapFailed` if the key material does not
    /// authenticate under this provider's master key.
    fn unwrap_dek(&self, wrapped_dek: &[u8]) -> Result<SecretVec<u8>, KeyProviderError>;
}
