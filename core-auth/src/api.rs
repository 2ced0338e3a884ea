//! Authorized Web API access.
//!
//! [`ApiClient`] attaches the session's bearer token to outgoing requests.
//! A `401` forces one token refresh and a single replay; a second `401`, or
//! a refresh that fails, ends the session.

use crate::error::{AuthError, Result};
use crate::session::SessionManager;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::CoreConfig;
use core_runtime::events::SignOutReason;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct ApiClient {
    http_client: Arc<dyn HttpClient>,
    session: Arc<SessionManager>,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        session: Arc<SessionManager>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            session,
            base_url: base_url.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &CoreConfig, session: Arc<SessionManager>) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            session,
            config.api_base_url.clone(),
            config.request_timeout,
        )
    }

    /// Absolute Web API URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Sends `request` with the session's access token.
    ///
    /// Any `Authorization` header on `request` is replaced. Non-2xx
    /// responses other than `401` are returned to the caller untouched.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when there is no session or it could
    /// not be recovered after a `401`; [`AuthError::Network`] for transport
    /// failures.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let epoch = self.session.current_epoch();
        let access_token = self.session.valid_access_token().await?;
        let response = self.send(request.clone(), &access_token).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        info!("Access token rejected, forcing refresh");
        let state = self.session.refresh_session().await.map_err(|e| {
            warn!(error = %e, "Refresh after 401 failed");
            AuthError::NotAuthenticated
        })?;
        let access_token = state
            .access_token()
            .ok_or(AuthError::NotAuthenticated)?
            .to_string();

        let response = self.send(request, &access_token).await?;
        if response.is_unauthorized() {
            warn!("Refreshed access token rejected, signing out");
            self.session
                .end_session_in(epoch, SignOutReason::RefreshFailed)
                .await;
            return Err(AuthError::NotAuthenticated);
        }

        Ok(response)
    }

    /// `GET` a Web API path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = HttpRequest::get(self.url(path)).header("Accept", "application/json");
        let response = self.execute(request).await?;

        if !response.is_success() {
            return Err(AuthError::Network(format!(
                "HTTP {} from {}",
                response.status, path
            )));
        }

        response
            .json()
            .map_err(|e| AuthError::Network(format!("Invalid response from {}: {}", path, e)))
    }

    async fn send(&self, mut request: HttpRequest, access_token: &str) -> Result<HttpResponse> {
        if request.timeout.is_none() {
            request = request.timeout(self.request_timeout);
        }
        if !request.has_header("Accept") {
            request = request.header("Accept", "application/json");
        }
        let request = request.bearer_token(access_token);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        debug!(status = response.status, "Web API response");
        Ok(response)
    }
}
