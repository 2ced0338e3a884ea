//! Session State Manager
//!
//! Sole writer of [`SessionState`]. The current state is published through a
//! `tokio::sync::watch` channel and every transition of note is mirrored on
//! the runtime [`EventBus`] as an [`AuthEvent`].
//!
//! Each logout advances the [`CredentialStore`] epoch. Operations remember
//! the epoch they started in; if it has moved on, their results are dropped
//! without publishing, persisting or clearing anything.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result, PROFILE_FETCH_MESSAGE};
use crate::exchange::TokenExchangeClient;
use crate::profile::ProfileClient;
use crate::types::{SessionState, TokenSet, UserProfile};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SignOutReason};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, instrument, warn};

pub struct SessionManager {
    store: Arc<CredentialStore>,
    exchange: TokenExchangeClient,
    profile: ProfileClient,
    state: watch::Sender<SessionState>,
    event_bus: EventBus,
    bootstrapped: OnceCell<()>,
}

impl SessionManager {
    pub fn new(
        store: Arc<CredentialStore>,
        exchange: TokenExchangeClient,
        profile: ProfileClient,
        event_bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::logged_out());
        Self {
            store,
            exchange,
            profile,
            state,
            event_bus,
            bootstrapped: OnceCell::new(),
        }
    }

    /// Snapshot of the current session.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Restores a persisted session. Runs once per manager; later calls
    /// return the current state without touching storage or the network.
    pub async fn bootstrap(&self) -> SessionState {
        self.bootstrapped
            .get_or_init(|| self.restore_session())
            .await;
        self.state()
    }

    #[instrument(skip(self))]
    async fn restore_session(&self) {
        let epoch = self.current_epoch();
        self.set_loading(true);

        let Some(tokens) = self.store.read(&self.exchange).await else {
            debug!("No stored session");
            if self.is_current(epoch) {
                self.state.send_replace(SessionState::logged_out());
            }
            return;
        };

        let profile = self.profile.fetch(&tokens.access_token).await;
        if !self.is_current(epoch) {
            debug!("Session changed during restore, ignoring stored session");
            return;
        }

        match profile {
            Ok(user) => {
                self.store.write_user_for(epoch, &user).await;
                info!(user_id = %user.id, "Restored session");
                self.publish_signed_in(tokens, Some(user), None);
            }
            Err(e) => {
                warn!(error = %e, "Stored session could not be validated, signing out");
                self.end_session_in(epoch, SignOutReason::BootstrapFailed).await;
            }
        }
    }

    /// Completes a sign-in: persist tokens, fetch the profile, then publish.
    ///
    /// A profile failure does not undo the sign-in; the session is
    /// authenticated with no user and the error "Failed to get user profile".
    pub async fn on_tokens_acquired(&self, tokens: TokenSet) -> SessionState {
        self.complete_sign_in(self.current_epoch(), tokens).await
    }

    /// [`on_tokens_acquired`](Self::on_tokens_acquired) for a sign-in that
    /// began in `epoch`. Nothing is persisted or published once a logout
    /// has ended that epoch.
    #[instrument(skip(self, tokens))]
    pub(crate) async fn complete_sign_in(&self, epoch: u64, tokens: TokenSet) -> SessionState {
        if !self.store.write_for(epoch, &tokens).await && self.is_current(epoch) {
            warn!("Session tokens could not be persisted");
        }

        let profile = self.profile.fetch(&tokens.access_token).await;
        if !self.is_current(epoch) {
            debug!("Session ended during sign-in, dropping result");
            return self.state();
        }

        match profile {
            Ok(user) => {
                self.store.write_user_for(epoch, &user).await;
                info!(user_id = %user.id, "Signed in");
                self.publish_signed_in(tokens, Some(user), None);
            }
            Err(e) => {
                warn!(error = %e, "Signed in without a user profile");
                self.publish_signed_in(tokens, None, Some(PROFILE_FETCH_MESSAGE.to_string()));
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: PROFILE_FETCH_MESSAGE.to_string(),
                    recoverable: true,
                }));
            }
        }

        self.state()
    }

    /// A refresh failed for good: same as [`logout`](Self::logout) but
    /// reported with [`SignOutReason::RefreshFailed`].
    pub async fn on_refresh_failed(&self) {
        self.end_session(SignOutReason::RefreshFailed).await;
    }

    pub async fn logout(&self) {
        self.end_session(SignOutReason::UserInitiated).await;
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|state| state.error = Some(message));
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.is_loading, loading) != loading);
    }

    /// Records a failed sign-in attempt: loading cleared, `message` shown.
    pub(crate) fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.error = Some(message.clone());
        });
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
            message,
            recoverable: true,
        }));
    }

    /// Forces a refresh with the current refresh token and republishes the
    /// session with the new tokens and a re-fetched profile.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] without a session. A failed refresh
    /// ends the session and returns the refresh error.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<SessionState> {
        let epoch = self.current_epoch();

        let current = match self.state().tokens {
            Some(tokens) => Some(tokens),
            None => self.store.read_raw().await,
        };
        let Some(current) = current else {
            return Err(AuthError::NotAuthenticated);
        };

        let tokens = match self.exchange.refresh_for(epoch, &current.refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.end_session_in(epoch, SignOutReason::RefreshFailed).await;
                return Err(e);
            }
        };

        let user = match self.profile.fetch(&tokens.access_token).await {
            Ok(user) => Some(user),
            Err(e) => {
                debug!(error = %e, "Keeping previous profile after refresh");
                self.state().user
            }
        };

        if !self.is_current(epoch) {
            debug!("Session ended during refresh, dropping result");
            return Err(AuthError::NotAuthenticated);
        }

        if let Some(user) = &user {
            self.store.write_user_for(epoch, user).await;
        }
        self.state
            .send_replace(SessionState::authenticated(tokens, user));
        Ok(self.state())
    }

    /// An access token that is not within the refresh buffer of expiry,
    /// refreshing first when needed.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when no usable credentials remain; an
    /// authenticated session is ended in that case.
    pub async fn valid_access_token(&self) -> Result<String> {
        let epoch = self.current_epoch();

        match self.store.read(&self.exchange).await {
            Some(tokens) if self.is_current(epoch) => {
                let access_token = tokens.access_token.clone();
                self.state.send_if_modified(|state| {
                    if state.is_authenticated && state.tokens.as_ref() != Some(&tokens) {
                        state.tokens = Some(tokens);
                        true
                    } else {
                        false
                    }
                });
                Ok(access_token)
            }
            Some(_) => {
                debug!("Session ended while reading credentials, dropping result");
                Err(AuthError::NotAuthenticated)
            }
            None => {
                if self.is_current(epoch) && self.is_authenticated() {
                    warn!("Session credentials are gone, signing out");
                    self.end_session_in(epoch, SignOutReason::RefreshFailed).await;
                }
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    fn publish_signed_in(&self, tokens: TokenSet, user: Option<UserProfile>, error: Option<String>) {
        let user_id = user.as_ref().map(|u| u.id.clone()).unwrap_or_default();
        let mut state = SessionState::authenticated(tokens, user);
        state.error = error;
        self.state.send_replace(state);
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SignedIn { user_id }));
    }

    async fn end_session(&self, reason: SignOutReason) {
        self.store.invalidate().await;
        self.publish_signed_out(reason);
    }

    /// Ends the session that was current in `epoch`, leaving a newer one
    /// untouched.
    pub(crate) async fn end_session_in(&self, epoch: u64, reason: SignOutReason) {
        if self.store.invalidate_from(epoch).await {
            self.publish_signed_out(reason);
        } else {
            debug!(?reason, "Session already replaced, not signing out");
        }
    }

    fn publish_signed_out(&self, reason: SignOutReason) {
        self.state.send_replace(SessionState::logged_out());
        info!(?reason, "Signed out");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SignedOut { reason }));
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.store.epoch()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.store.is_current(epoch)
    }
}
