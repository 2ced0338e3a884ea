//! Credential Store
//!
//! Typed access to the token and user records kept in the host's
//! [`SecureStore`]. Expiry-aware retrieval lives here: a token set inside the
//! refresh buffer is never handed out; it is refreshed first or dropped.
//!
//! Storage faults never escape this module. They are logged with the key
//! name and downgraded: reads return `None`, writes return `false`.
//!
//! The store also keeps the session epoch. [`invalidate`](CredentialStore::invalidate)
//! bumps it and clears the records in one step. The `*_for` writers take the
//! epoch their operation started in and do nothing once it has moved on, so
//! an operation overtaken by a logout can neither persist its result nor
//! clear the records of the session that replaced it.

use crate::error::Result;
use crate::types::{TokenSet, UserProfile};
use async_trait::async_trait;
use bridge_traits::{Clock, SecureStore};
use core_runtime::config::CoreConfig;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Key holding the serialized [`TokenSet`].
pub const TOKEN_STORAGE_KEY: &str = "access_token";

/// Key holding the serialized [`UserProfile`].
pub const USER_STORAGE_KEY: &str = "user";

/// Exchanges a refresh token for a new token set.
///
/// Implemented by [`TokenExchangeClient`](crate::exchange::TokenExchangeClient).
/// Passed into [`CredentialStore::read`] rather than owned by the store,
/// since the exchange client itself persists through the store.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refresh on behalf of session `epoch`. The result must not be
    /// persisted, and a failure must not clear the store, once `epoch` has
    /// ended.
    async fn refresh_in(&self, epoch: u64, refresh_token: &str) -> Result<TokenSet>;
}

pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
    refresh_buffer_ms: i64,
    epoch: AtomicU64,
    /// Serializes record mutations with epoch changes.
    writes: Mutex<()>,
}

impl CredentialStore {
    pub fn new(
        secure_store: Arc<dyn SecureStore>,
        clock: Arc<dyn Clock>,
        refresh_buffer: Duration,
    ) -> Self {
        Self {
            secure_store,
            clock,
            refresh_buffer_ms: i64::try_from(refresh_buffer.as_millis()).unwrap_or(i64::MAX),
            epoch: AtomicU64::new(0),
            writes: Mutex::new(()),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.secure_store),
            Arc::clone(&config.clock),
            config.refresh_buffer,
        )
    }

    /// Current stored tokens, refreshed through `refresher` when they are
    /// within the refresh buffer of expiry.
    ///
    /// Returns `None` when nothing usable is stored or the refresh fails.
    /// A failed refresh leaves the store cleared.
    #[instrument(skip(self, refresher))]
    pub async fn read(&self, refresher: &dyn TokenRefresher) -> Option<TokenSet> {
        let epoch = self.epoch();
        let tokens = self.read_raw().await?;
        let now = self.clock.unix_timestamp_millis();

        if !tokens.needs_refresh(now, self.refresh_buffer_ms) {
            return Some(tokens);
        }

        debug!(
            expires_at = tokens.expires_at,
            expired = tokens.is_expired_at(now),
            "Stored access token is near expiry, refreshing"
        );

        match refresher.refresh_in(epoch, &tokens.refresh_token).await {
            Ok(fresh) => Some(fresh),
            Err(e) => {
                warn!(error = %e, "Refresh of stored tokens failed, discarding them");
                self.clear_for(epoch).await;
                None
            }
        }
    }

    /// Epoch of the current session. Changes only through
    /// [`invalidate`](Self::invalidate).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Ends the current session epoch and removes both records. Writes
    /// tagged with an earlier epoch are ignored from here on.
    pub async fn invalidate(&self) -> bool {
        let _guard = self.writes.lock().await;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, "Session epoch advanced");
        self.remove_records().await
    }

    /// [`invalidate`](Self::invalidate) only while `epoch` is still the
    /// current one. Returns `false` when a newer session already exists.
    pub async fn invalidate_from(&self, epoch: u64) -> bool {
        let _guard = self.writes.lock().await;
        if self
            .epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        debug!(epoch = epoch + 1, "Session epoch advanced");
        self.remove_records().await;
        true
    }

    /// The persisted token record without any expiry check.
    pub async fn read_raw(&self) -> Option<TokenSet> {
        let tokens: TokenSet = self.load(TOKEN_STORAGE_KEY).await?;
        if tokens.is_complete() {
            Some(tokens)
        } else {
            warn!(key = TOKEN_STORAGE_KEY, "Stored token record is incomplete, discarding");
            self.delete(TOKEN_STORAGE_KEY).await;
            None
        }
    }

    /// Overwrites the token record in a single store write.
    pub async fn write(&self, tokens: &TokenSet) -> bool {
        let _guard = self.writes.lock().await;
        self.save(TOKEN_STORAGE_KEY, tokens).await
    }

    /// Like [`write`](Self::write), but only while `epoch` is current.
    pub async fn write_for(&self, epoch: u64, tokens: &TokenSet) -> bool {
        let _guard = self.writes.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, "Dropping token write from an ended session");
            return false;
        }
        self.save(TOKEN_STORAGE_KEY, tokens).await
    }

    /// Removes the token and user records. Both deletions are attempted even
    /// if one fails; clearing an empty store succeeds.
    pub async fn clear(&self) -> bool {
        let _guard = self.writes.lock().await;
        self.remove_records().await
    }

    /// Like [`clear`](Self::clear), but only while `epoch` is current.
    pub async fn clear_for(&self, epoch: u64) -> bool {
        let _guard = self.writes.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, "Ignoring clear from an ended session");
            return false;
        }
        self.remove_records().await
    }

    pub async fn write_user(&self, user: &UserProfile) -> bool {
        let _guard = self.writes.lock().await;
        self.save(USER_STORAGE_KEY, user).await
    }

    pub async fn write_user_for(&self, epoch: u64, user: &UserProfile) -> bool {
        let _guard = self.writes.lock().await;
        if !self.is_current(epoch) {
            return false;
        }
        self.save(USER_STORAGE_KEY, user).await
    }

    pub async fn read_user(&self) -> Option<UserProfile> {
        self.load(USER_STORAGE_KEY).await
    }

    async fn remove_records(&self) -> bool {
        let tokens_cleared = self.delete(TOKEN_STORAGE_KEY).await;
        let user_cleared = self.delete(USER_STORAGE_KEY).await;
        tokens_cleared && user_cleared
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.secure_store.get_secret(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read from secure store");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Stored record is corrupted, discarding");
                self.delete(key).await;
                None
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize record");
                return false;
            }
        };

        match self.secure_store.set_secret(key, &bytes).await {
            Ok(()) => {
                debug!(key, "Stored record");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to write to secure store");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.secure_store.delete_secret(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to delete from secure store");
                false
            }
        }
    }
}
