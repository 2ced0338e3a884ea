//! Credential storage backed by the host's encrypted store
//! (Keychain on Apple platforms, Keystore-backed preferences on Android,
//! the OS vault on desktop via `bridge-desktop`).

use async_trait::async_trait;

use crate::error::Result;

/// Byte-valued secrets addressed by string keys.
///
/// A `set_secret` replaces the previous value in one write, so readers see
/// either the old record or the new one. Values are opaque; the caller owns
/// the encoding.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing a key that does not exist is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
