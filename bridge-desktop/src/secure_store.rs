//! `SecureStore` over the OS credential vault via `keyring`
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::{debug, warn};

const DEFAULT_SERVICE_NAME: &str = "spotify-client";

/// One vault entry per key under a single service name. Entries hold
/// strings, so record bytes are stored base64 encoded.
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(|e| vault_error(key, e))
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A missing or locked vault is reported as unavailable rather than failed.
fn vault_error(key: &str, e: keyring::Error) -> BridgeError {
    match e {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            BridgeError::NotAvailable(format!("Credential vault unavailable for '{}': {}", key, e))
        }
        other => BridgeError::OperationFailed(format!("Credential vault error for '{}': {}", key, other)),
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?
            .set_password(&STANDARD.encode(value))
            .map_err(|e| vault_error(key, e))?;
        debug!(key, bytes = value.len(), "Wrote vault entry");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let encoded = match self.entry(key)?.get_password() {
            Ok(encoded) => encoded,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(vault_error(key, e)),
        };

        STANDARD.decode(encoded.as_bytes()).map(Some).map_err(|e| {
            warn!(key, error = %e, "Vault entry is not valid base64");
            BridgeError::OperationFailed(format!("Vault entry '{}' is corrupted: {}", key, e))
        })
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => {
                debug!(key, "Deleted vault entry");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(vault_error(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names() {
        assert_eq!(KeyringSecureStore::default().service_name, "spotify-client");
        assert_eq!(
            KeyringSecureStore::with_service_name("spotify-client-test").service_name,
            "spotify-client-test"
        );
    }

    #[test]
    fn test_missing_entry_is_not_an_availability_error() {
        let err = vault_error("user", keyring::Error::NoEntry);
        assert!(matches!(err, BridgeError::OperationFailed(msg) if msg.contains("'user'")));
    }

    #[tokio::test]
    async fn test_token_record_round_trip_when_vault_available() {
        // Headless CI machines usually have no secret service; treat that as a skip.
        let store = KeyringSecureStore::with_service_name("spotify-client-test");
        let key = "access_token";
        let record = br#"{"accessToken":"A1","refreshToken":"R1"}"#;

        let _ = store.delete_secret(key).await;

        match store.set_secret(key, record).await {
            Ok(()) => {
                if let Ok(Some(retrieved)) = store.get_secret(key).await {
                    assert_eq!(retrieved, record.to_vec());
                }
                assert!(store.delete_secret(key).await.is_ok());
                assert!(store.delete_secret(key).await.is_ok());
                assert!(!store.has_secret(key).await.unwrap_or(false));
            }
            Err(e) => println!("Credential vault not available ({}), skipping", e),
        }
    }
}
