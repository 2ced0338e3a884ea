//! Authorization Flow Controller
//!
//! Drives one interactive Authorization Code + PKCE sign-in at a time:
//!
//! ```text
//! Idle → Requesting → AwaitingUserInteraction ─┬─ ExchangingTokens → Success
//!                                              ├─ Cancelled
//!                                              └─ Error
//! ```
//!
//! A request (verifier, `state`, authorize URL) is prepared ahead of time so
//! the browser can open without delay. Every attempt consumes it; a fresh one
//! is prepared when the attempt ends, however it ends.

use crate::error::{AuthError, Result, AUTH_NOT_READY_MESSAGE, LOGIN_FAILED_MESSAGE};
use crate::exchange::TokenExchangeClient;
use crate::pkce::{generate_state, PkceVerifier, CHALLENGE_METHOD};
use crate::session::SessionManager;
use crate::types::SessionState;
use bridge_traits::{AuthorizationPresenter, RedirectResult};
use core_runtime::config::OAuthConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Requesting,
    AwaitingUserInteraction,
    ExchangingTokens,
    Success,
    Cancelled,
    Error,
}

impl FlowState {
    /// An attempt owns the controller in these states.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            FlowState::Requesting | FlowState::AwaitingUserInteraction | FlowState::ExchangingTokens
        )
    }
}

/// Result of a [`login`](AuthorizationFlow::login) that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    SignedIn(SessionState),
    /// The user closed the browser session. No error is recorded.
    Cancelled,
}

/// A prepared authorization request.
pub struct AuthRequest {
    url: String,
    state: String,
    verifier: PkceVerifier,
}

impl AuthRequest {
    /// Generates a PKCE pair and `state`, and builds the authorize URL.
    pub fn build(config: &OAuthConfig) -> Result<Self> {
        let verifier = PkceVerifier::generate();
        let state = generate_state();

        let mut url = Url::parse(&config.authorize_url)
            .map_err(|e| AuthError::Config(format!("Invalid authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("scope", &config.scope_string())
            .append_pair("code_challenge", &verifier.challenge())
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("state", &state);

        Ok(Self {
            url: url.into(),
            state,
            verifier,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn verifier(&self) -> &PkceVerifier {
        &self.verifier
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("verifier", &self.verifier)
            .finish()
    }
}

/// Extracts the authorization code from a redirect back to the app.
///
/// The provider's `error`/`error_description`, a missing code and a `state`
/// other than `expected_state` all fail with [`AuthError::Authorization`].
pub fn parse_redirect(redirect_url: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(redirect_url)
        .map_err(|e| AuthError::Authorization(format!("invalid redirect URL: {}", e)))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        let description = params.get("error_description").unwrap_or(error);
        return Err(AuthError::Authorization(description.clone()));
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::Authorization("state mismatch".to_string()));
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| AuthError::Authorization("missing authorization code".to_string()))
}

struct FlowInner {
    state: FlowState,
    request: Option<AuthRequest>,
    last_outcome: Option<FlowState>,
}

pub struct AuthorizationFlow {
    config: OAuthConfig,
    presenter: Arc<dyn AuthorizationPresenter>,
    exchange: TokenExchangeClient,
    session: Arc<SessionManager>,
    event_bus: EventBus,
    inner: Mutex<FlowInner>,
}

impl AuthorizationFlow {
    pub fn new(
        config: OAuthConfig,
        presenter: Arc<dyn AuthorizationPresenter>,
        exchange: TokenExchangeClient,
        session: Arc<SessionManager>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            presenter,
            exchange,
            session,
            event_bus,
            inner: Mutex::new(FlowInner {
                state: FlowState::Idle,
                request: None,
                last_outcome: None,
            }),
        }
    }

    /// Prepares a new authorization request, replacing any unused one, and
    /// returns its authorize URL.
    pub fn prepare(&self) -> Result<String> {
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            return Err(AuthError::SignInInProgress);
        }

        inner.request = None;
        let request = AuthRequest::build(&self.config)?;
        let url = request.url.clone();
        inner.request = Some(request);
        Ok(url)
    }

    /// Runs one interactive sign-in.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SignInInProgress`] while another attempt runs
    /// - [`AuthError::AuthNotReady`] when no request is prepared
    /// - [`AuthError::Authorization`] for an error or untrusted redirect
    /// - [`AuthError::Presenter`] or [`AuthError::TokenExchange`]
    ///
    /// Each failure is also reflected in the session's `error`.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<FlowOutcome> {
        let request = {
            let mut inner = self.lock();
            if inner.state.is_in_flight() {
                debug!(state = ?inner.state, "Rejecting concurrent sign-in");
                return Err(AuthError::SignInInProgress);
            }
            let prepared = inner.request.take();
            match prepared {
                Some(request) => {
                    inner.state = FlowState::Requesting;
                    request
                }
                None => {
                    drop(inner);
                    warn!("Sign-in attempted before an authorization request was prepared");
                    self.session.set_error(AUTH_NOT_READY_MESSAGE);
                    return Err(AuthError::AuthNotReady);
                }
            }
        };

        let mut attempt = Attempt {
            flow: self,
            terminal: FlowState::Cancelled,
        };
        let result = self.run(&request, &mut attempt).await;
        if result.is_err() {
            attempt.terminal = FlowState::Error;
        }
        result
    }

    async fn run(&self, request: &AuthRequest, attempt: &mut Attempt<'_>) -> Result<FlowOutcome> {
        let epoch = self.session.current_epoch();
        self.session.set_loading(true);
        self.session.clear_error();
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn));

        self.set_state(FlowState::AwaitingUserInteraction);
        let redirect = self
            .presenter
            .present(request.url(), &self.config.redirect_uri)
            .await
            .map_err(|e| {
                warn!(error = %e, "Authorization presenter failed");
                self.session.fail(LOGIN_FAILED_MESSAGE);
                AuthError::Presenter(e.to_string())
            })?;

        let redirect_url = match redirect {
            RedirectResult::Redirected { url } => url,
            RedirectResult::Cancelled | RedirectResult::Dismissed => {
                info!("Sign-in cancelled by user");
                self.session.set_loading(false);
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Auth(AuthEvent::SignInCancelled));
                return Ok(FlowOutcome::Cancelled);
            }
        };

        let code = parse_redirect(&redirect_url, request.state()).map_err(|e| {
            warn!(error = %e, "Authorization redirect rejected");
            self.session.fail(e.to_string());
            e
        })?;

        self.set_state(FlowState::ExchangingTokens);
        let tokens = self
            .exchange
            .exchange_code_for(epoch, &code, request.verifier().as_str())
            .await
            .map_err(|e| {
                warn!(error = %e, "Authorization code exchange failed");
                self.session.fail(e.to_string());
                e
            })?;

        let state = self.session.complete_sign_in(epoch, tokens).await;
        attempt.terminal = FlowState::Success;
        Ok(FlowOutcome::SignedIn(state))
    }

    pub fn state(&self) -> FlowState {
        self.lock().state
    }

    /// Terminal state of the most recent attempt.
    pub fn last_outcome(&self) -> Option<FlowState> {
        self.lock().last_outcome
    }

    /// Whether a request is prepared and `login` can start immediately.
    pub fn is_ready(&self) -> bool {
        self.lock().request.is_some()
    }

    fn set_state(&self, state: FlowState) {
        self.lock().state = state;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the controller to `Idle` with a fresh request when an attempt
/// ends, including when the `login` future is dropped mid-way.
struct Attempt<'a> {
    flow: &'a AuthorizationFlow,
    terminal: FlowState,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        let next = match AuthRequest::build(&self.flow.config) {
            Ok(request) => Some(request),
            Err(e) => {
                warn!(error = %e, "Could not prepare next authorization request");
                None
            }
        };

        {
            let mut inner = self.flow.lock();
            inner.state = FlowState::Idle;
            inner.last_outcome = Some(self.terminal);
            inner.request = next;
        }

        self.flow.session.set_loading(false);
        debug!(outcome = ?self.terminal, "Sign-in attempt finished");
    }
}
