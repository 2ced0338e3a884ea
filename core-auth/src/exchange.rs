//! Token Exchange Client
//!
//! Talks to the accounts service token endpoint:
//! - `authorization_code` grant with the PKCE verifier
//! - `refresh_token` grant, single-flight across concurrent callers
//!
//! Requests are sent exactly once ([`RetryPolicy::no_retry`]). Successful
//! grants are persisted through the [`CredentialStore`] before they are
//! returned; a failed refresh clears it. Both happen only while the session
//! epoch the request started in is still current.
//!
//! # Example
//!
//! ```ignore
//! let exchange = TokenExchangeClient::from_config(&config, store.clone(), event_bus.clone());
//! let tokens = exchange.exchange_code("abc", verifier.as_str()).await?;
//! ```

use crate::credential_store::{CredentialStore, TokenRefresher};
use crate::error::{
    AuthError, Result, TOKEN_EXCHANGE_FAILED_MESSAGE, TOKEN_REFRESH_FAILED_MESSAGE,
};
use crate::types::TokenSet;
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::Clock;
use core_runtime::config::{CoreConfig, OAuthConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenSet>>>;

/// A refresh request other callers may join: same session epoch, same
/// refresh token.
struct InFlightRefresh {
    epoch: u64,
    refresh_token: String,
    future: SharedRefresh,
}

/// Successful token endpoint response (RFC 6749 §5.1). A body without
/// `token_type` or `expires_in` does not parse and is rejected.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: i64,
}

/// Error response (RFC 6749 §5.2).
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the token endpoint. Cloning shares the in-flight refresh.
#[derive(Clone)]
pub struct TokenExchangeClient {
    inner: Arc<ExchangeInner>,
}

struct ExchangeInner {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    store: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    event_bus: EventBus,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

impl TokenExchangeClient {
    pub fn new(
        config: OAuthConfig,
        http_client: Arc<dyn HttpClient>,
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ExchangeInner {
                config,
                http_client,
                store,
                clock,
                request_timeout,
                event_bus,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &CoreConfig, store: Arc<CredentialStore>, event_bus: EventBus) -> Self {
        Self::new(
            config.oauth.clone(),
            Arc::clone(&config.http_client),
            store,
            Arc::clone(&config.clock),
            config.request_timeout,
            event_bus,
        )
    }

    /// Exchange an authorization code for tokens and persist them.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExchange`] carrying the provider's
    /// `error_description`, or "Token exchange failed" when it sent none.
    /// Transport failures and responses without a refresh token map to the
    /// same variant.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet> {
        let epoch = self.inner.store.epoch();
        self.exchange_code_for(epoch, code, code_verifier).await
    }

    /// [`exchange_code`](Self::exchange_code) on behalf of a sign-in that
    /// began in session `epoch`. Tokens are persisted only if that epoch is
    /// still current.
    #[instrument(skip(self, code, code_verifier))]
    pub(crate) async fn exchange_code_for(
        &self,
        epoch: u64,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet> {
        let inner = &self.inner;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", inner.config.redirect_uri.as_str()),
            ("client_id", inner.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        debug!("Exchanging authorization code for tokens");

        let response = inner
            .post_token_request(&params, TOKEN_EXCHANGE_FAILED_MESSAGE)
            .await
            .map_err(AuthError::TokenExchange)?;

        let Some(refresh_token) = response.refresh_token else {
            warn!("Token endpoint granted no refresh token for authorization code");
            return Err(AuthError::TokenExchange(format!(
                "{}: no refresh token granted",
                TOKEN_EXCHANGE_FAILED_MESSAGE
            )));
        };

        let tokens = TokenSet::from_grant(
            response.access_token,
            refresh_token,
            response.token_type,
            response.scope,
            response.expires_in,
            inner.clock.unix_timestamp_millis(),
        );

        let missing: Vec<&str> = inner
            .config
            .scopes
            .iter()
            .map(String::as_str)
            .filter(|wanted| !tokens.scopes().any(|granted| granted == *wanted))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Token granted without some requested scopes");
        }

        if !inner.store.write_for(epoch, &tokens).await {
            warn!("Acquired tokens were not persisted; session will not survive a restart");
        }

        info!(
            expires_in = response.expires_in,
            "Exchanged authorization code for tokens"
        );
        Ok(tokens)
    }

    /// Refresh the access token.
    ///
    /// Concurrent calls for the same refresh token within one session share
    /// one network request and all receive its result. If the response
    /// omits `refresh_token`, `refresh_token` is kept.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenRefresh`]; the credential store has been cleared
    /// unless the session ended while the request was out.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let epoch = self.inner.store.epoch();
        self.refresh_for(epoch, refresh_token).await
    }

    pub(crate) async fn refresh_for(&self, epoch: u64, refresh_token: &str) -> Result<TokenSet> {
        let shared = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.as_ref() {
                Some(in_flight)
                    if in_flight.epoch == epoch && in_flight.refresh_token == refresh_token =>
                {
                    debug!("Joining in-flight token refresh");
                    in_flight.future.clone()
                }
                _ => {
                    let future = Arc::clone(&self.inner)
                        .run_refresh(epoch, refresh_token.to_string())
                        .boxed()
                        .shared();
                    *slot = Some(InFlightRefresh {
                        epoch,
                        refresh_token: refresh_token.to_string(),
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        let result = shared.clone().await;

        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.future.ptr_eq(&shared))
        {
            *slot = None;
        }

        result
    }

    /// Whether a refresh request is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl TokenRefresher for TokenExchangeClient {
    async fn refresh_in(&self, epoch: u64, refresh_token: &str) -> Result<TokenSet> {
        self.refresh_for(epoch, refresh_token).await
    }
}

impl ExchangeInner {
    async fn run_refresh(self: Arc<Self>, epoch: u64, refresh_token: String) -> Result<TokenSet> {
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = match self
            .post_token_request(&params, TOKEN_REFRESH_FAILED_MESSAGE)
            .await
        {
            Ok(response) => response,
            Err(message) => {
                warn!(error = %message, "Token refresh failed, clearing stored credentials");
                self.store.clear_for(epoch).await;
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: message.clone(),
                    recoverable: false,
                }));
                return Err(AuthError::TokenRefresh(message));
            }
        };

        let rotated = response.refresh_token.is_some();
        let tokens = TokenSet::from_grant(
            response.access_token,
            response.refresh_token.unwrap_or(refresh_token),
            response.token_type,
            response.scope,
            response.expires_in,
            self.clock.unix_timestamp_millis(),
        );

        if !self.store.write_for(epoch, &tokens).await {
            warn!("Refreshed tokens were not persisted");
        }

        info!(rotated, expires_at = tokens.expires_at, "Access token refreshed");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                expires_at: tokens.expires_at,
            }));

        Ok(tokens)
    }

    /// POST a form to the token endpoint. Any failure becomes a
    /// user-facing message: the provider's description or `fallback`.
    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        fallback: &str,
    ) -> std::result::Result<TokenResponse, String> {
        let request = HttpRequest::post(self.config.token_url.as_str())
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .form(&params)
            .map_err(|e| format!("{}: {}", fallback, e))?;

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| {
                warn!(error = %e, "Token endpoint unreachable");
                format!("{}: {}", fallback, e)
            })?;

        if !response.is_success() {
            let body: TokenErrorResponse = response.json().unwrap_or_default();
            warn!(
                status = response.status,
                error = body.error.as_deref().unwrap_or("unknown"),
                "Token endpoint rejected grant"
            );
            return Err(body
                .error_description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| fallback.to_string()));
        }

        response.json::<TokenResponse>().map_err(|e| {
            warn!(error = %e, "Malformed token endpoint response");
            fallback.to_string()
        })
    }
}
