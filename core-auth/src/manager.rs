//! # Authentication Manager
//!
//! Entry point the app holds on to. Owns one instance of each auth component
//! and wires them from a single [`CoreConfig`]:
//!
//! - [`CredentialStore`] over the injected `SecureStore`
//! - [`TokenExchangeClient`] for code exchange and single-flight refresh
//! - [`SessionManager`], the only writer of [`SessionState`]
//! - [`AuthorizationFlow`] driving the injected `AuthorizationPresenter`
//! - [`ApiClient`] for bearer-authorized Web API calls
//!
//! ## Usage
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .presenter(Arc::new(MyBrowserPresenter::new()))
//!     .build()?;
//! let event_bus = EventBus::new(config.event_buffer_size);
//! let auth = AuthManager::new(&config, event_bus.clone());
//!
//! let session = auth.bootstrap().await;
//! if !session.is_authenticated {
//!     auth.login().await?;
//! }
//! ```

use crate::api::ApiClient;
use crate::credential_store::CredentialStore;
use crate::error::Result;
use crate::exchange::TokenExchangeClient;
use crate::flow::{AuthorizationFlow, FlowOutcome, FlowState};
use crate::profile::ProfileClient;
use crate::session::SessionManager;
use crate::types::SessionState;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

pub struct AuthManager {
    session: Arc<SessionManager>,
    flow: AuthorizationFlow,
    api: ApiClient,
    event_bus: EventBus,
}

impl AuthManager {
    /// Wires the components and prepares the first authorization request.
    pub fn new(config: &CoreConfig, event_bus: EventBus) -> Self {
        let store = Arc::new(CredentialStore::from_config(config));
        let exchange =
            TokenExchangeClient::from_config(config, Arc::clone(&store), event_bus.clone());
        let session = Arc::new(SessionManager::new(
            store,
            exchange.clone(),
            ProfileClient::from_config(config),
            event_bus.clone(),
        ));
        let flow = AuthorizationFlow::new(
            config.oauth.clone(),
            Arc::clone(&config.presenter),
            exchange,
            Arc::clone(&session),
            event_bus.clone(),
        );
        let api = ApiClient::from_config(config, Arc::clone(&session));

        if let Err(e) = flow.prepare() {
            warn!(error = %e, "Initial authorization request could not be prepared");
        }

        info!(client_id = %config.oauth.client_id, "Auth manager initialized");

        Self {
            session,
            flow,
            api,
            event_bus,
        }
    }

    /// Restores the persisted session. Safe to call repeatedly; only the
    /// first call does any work.
    pub async fn bootstrap(&self) -> SessionState {
        self.session.bootstrap().await
    }

    /// Runs an interactive sign-in. See [`AuthorizationFlow::login`].
    pub async fn login(&self) -> Result<FlowOutcome> {
        self.flow.login().await
    }

    /// Prepares a fresh authorization request and returns its URL.
    pub fn prepare_login(&self) -> Result<String> {
        self.flow.prepare()
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.session.logout().await;
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Raw auth events as published on the runtime bus.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn clear_error(&self) {
        self.session.clear_error();
    }

    pub async fn refresh_session(&self) -> Result<SessionState> {
        self.session.refresh_session().await
    }

    pub async fn valid_access_token(&self) -> Result<String> {
        self.session.valid_access_token().await
    }

    pub fn api_client(&self) -> &ApiClient {
        &self.api
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    pub fn last_outcome(&self) -> Option<FlowState> {
        self.flow.last_outcome()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}
