//! # Core Configuration Module
//!
//! Builder-based configuration for the client core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds the injected host capabilities and the OAuth/API
//! settings every component is constructed from. The builder enforces
//! fail-fast validation so a misconfigured host learns about it at startup
//! rather than on the first sign-in.
//!
//! ## Required Dependencies
//!
//! - `AuthorizationPresenter` - opens the consent page (no platform default)
//! - `SecureStore` - credential persistence (desktop default: OS keychain)
//! - `HttpClient` - network access (desktop default: reqwest)
//!
//! `Clock` defaults to [`SystemClock`] everywhere.
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `SecureStore` and `HttpClient` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .presenter(Arc::new(MyBrowserSession))
//!     .secure_store(Arc::new(MyKeychain))
//!     .http_client(Arc::new(MyHttpClient))
//!     .client_id("066b93b708ef4bfb99ee25877296b19b")
//!     .build()?;
//! ```
//!
//! ## Client ID resolution
//!
//! 1. the value passed to [`CoreConfigBuilder::client_id`]
//! 2. the `SPOTIFY_CLIENT_ID` environment variable
//! 3. [`DEFAULT_CLIENT_ID`]

use crate::error::{Error, Result};
use bridge_traits::{AuthorizationPresenter, Clock, HttpClient, SecureStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Client id registered for the mobile app. PKCE clients carry no secret, so
/// shipping it is expected.
pub const DEFAULT_CLIENT_ID: &str = "066b93b708ef4bfb99ee25877296b19b";

/// Environment variable consulted when no client id is set explicitly.
pub const CLIENT_ID_ENV_VAR: &str = "SPOTIFY_CLIENT_ID";

pub const DEFAULT_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/";
pub const DEFAULT_REDIRECT_URI: &str = "musicplayerapp://auth";

/// Tokens are treated as expired this long before their real deadline.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Per-request timeout for accounts and Web API calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Scopes requested at sign-in: profile, library, playlists, history and playback.
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "user-library-read",
    "user-library-modify",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-read-recently-played",
    "user-top-read",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "streaming",
];

/// OAuth 2.0 client settings for the authorization-code + PKCE grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Settings for the given client id with the production endpoints,
    /// default redirect URI and default scopes.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Scopes in the space-delimited form the authorize endpoint expects.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("OAuth client id cannot be empty".to_string()));
        }

        if self.scopes.is_empty() {
            return Err(Error::Config(
                "At least one OAuth scope must be requested".to_string(),
            ));
        }

        Url::parse(&self.redirect_uri).map_err(|e| {
            Error::Config(format!(
                "Invalid redirect URI '{}': {}",
                self.redirect_uri, e
            ))
        })?;

        validate_http_url("authorize URL", &self.authorize_url)?;
        validate_http_url("token URL", &self.token_url)?;

        Ok(())
    }
}

fn validate_http_url(label: &str, value: &str) -> Result<Url> {
    let url =
        Url::parse(value).map_err(|e| Error::Config(format!("Invalid {} '{}': {}", label, value, e)))?;

    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(Error::Config(format!(
            "{} must use http(s), got scheme '{}'",
            label, other
        ))),
    }
}

/// Core configuration for the client core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub oauth: OAuthConfig,

    /// Web API base URL, with trailing slash
    pub api_base_url: String,

    pub request_timeout: Duration,

    /// Stored tokens closer than this to expiry are refreshed before use
    pub refresh_buffer: Duration,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    pub http_client: Arc<dyn HttpClient>,

    pub secure_store: Arc<dyn SecureStore>,

    pub presenter: Arc<dyn AuthorizationPresenter>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("oauth", &self.oauth)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("refresh_buffer", &self.refresh_buffer)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("presenter", &"AuthorizationPresenter { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Joins `path` onto the Web API base URL.
    ///
    /// ```ignore
    /// assert_eq!(config.api_url("v1/me"), "https://api.spotify.com/v1/me");
    /// ```
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - OAuth settings (client id, scopes, URLs)
    /// - API base URL is http(s)
    /// - Request timeout is non-zero and at most two minutes
    /// - Refresh buffer is below one hour
    pub fn validate(&self) -> Result<()> {
        self.oauth.validate()?;
        validate_http_url("API base URL", &self.api_base_url)?;

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout > Duration::from_secs(120) {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 120 seconds".to_string(),
            ));
        }

        if self.refresh_buffer >= Duration::from_secs(3600) {
            return Err(Error::Config(
                "Refresh buffer must be shorter than one hour".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn presenter_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AuthorizationPresenter".to_string(),
        message: "An AuthorizationPresenter is required to open the consent page. \
                 iOS: wrap ASWebAuthenticationSession. \
                 Android: wrap Custom Tabs with a deep-link redirect."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for the accounts service and Web API. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::DefaultUnavailable {
            capability: "HttpClient",
            message: e.to_string(),
        })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    client_id: Option<String>,
    redirect_uri: Option<String>,
    scopes: Option<Vec<String>>,
    authorize_url: Option<String>,
    token_url: Option<String>,
    api_base_url: Option<String>,
    request_timeout: Option<Duration>,
    refresh_buffer: Option<Duration>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    presenter: Option<Arc<dyn AuthorizationPresenter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the OAuth client id. See the module docs for the fallback order.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the redirect URI registered for the app.
    ///
    /// Default: `musicplayerapp://auth`
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Replaces the requested scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the authorize endpoint (tests, staging).
    pub fn authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    /// Overrides the token endpoint (tests, staging).
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Default: 10 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Default: 5 minutes
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based desktop client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store implementation.
    ///
    /// If not provided, the OS keychain is used when the `desktop-shims`
    /// feature is enabled.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the browser-session presenter. Always required.
    pub fn presenter(mut self, presenter: Arc<dyn AuthorizationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and has
    ///   no platform default
    /// - [`Error::Config`] when a value fails validation
    pub fn build(self) -> Result<CoreConfig> {
        let presenter = self.presenter.ok_or_else(presenter_missing_error)?;

        let client_id = self
            .client_id
            .or_else(|| std::env::var(CLIENT_ID_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

        let mut oauth = OAuthConfig::new(client_id);
        if let Some(redirect_uri) = self.redirect_uri {
            oauth.redirect_uri = redirect_uri;
        }
        if let Some(scopes) = self.scopes {
            oauth.scopes = scopes;
        }
        if let Some(authorize_url) = self.authorize_url {
            oauth.authorize_url = authorize_url;
        }
        if let Some(token_url) = self.token_url {
            oauth.token_url = token_url;
        }

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = CoreConfig {
            oauth,
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            request_timeout,
            refresh_buffer: self.refresh_buffer.unwrap_or(DEFAULT_REFRESH_BUFFER),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            secure_store,
            presenter,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
