//! Web API profile lookup (`GET /v1/me`).

use crate::error::{AuthError, Result};
use crate::types::UserProfile;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_runtime::config::CoreConfig;
use core_runtime::logging::redact_if_sensitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const PROFILE_PATH: &str = "v1/me";

pub struct ProfileClient {
    http_client: Arc<dyn HttpClient>,
    url: String,
    request_timeout: Duration,
}

impl ProfileClient {
    pub fn new(http_client: Arc<dyn HttpClient>, url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            http_client,
            url: url.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            config.api_url(PROFILE_PATH),
            config.request_timeout,
        )
    }

    /// Fetches the signed-in user's profile with `access_token`.
    ///
    /// Any non-2xx response, transport fault or malformed body is an
    /// [`AuthError::ProfileFetch`].
    #[instrument(skip(self, access_token))]
    pub async fn fetch(&self, access_token: &str) -> Result<UserProfile> {
        let request = HttpRequest::get(self.url.as_str())
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(error = %e, "Profile request failed");
            AuthError::ProfileFetch {
                status: None,
                message: e.to_string(),
            }
        })?;

        if !response.is_success() {
            warn!(status = response.status, "Profile request rejected");
            return Err(AuthError::ProfileFetch {
                status: Some(response.status),
                message: format!("HTTP {}", response.status),
            });
        }

        let profile: UserProfile = response.json().map_err(|e| AuthError::ProfileFetch {
            status: Some(response.status),
            message: e.to_string(),
        })?;

        let email = profile
            .email
            .as_deref()
            .map(|email| redact_if_sensitive("email", email))
            .unwrap_or_default();
        debug!(user_id = %profile.id, email = %email, "Fetched user profile");
        Ok(profile)
    }
}
