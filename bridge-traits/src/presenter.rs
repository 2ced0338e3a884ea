//! Authorization Presenter
//!
//! Opens the provider's consent page in a browser session owned by the host
//! and reports how that session ended.

use async_trait::async_trait;

use crate::error::Result;

/// How an interactive browser session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectResult {
    /// The browser navigated to a URL starting with the redirect prefix.
    /// The full URL, including query parameters, is returned untouched.
    Redirected { url: String },
    /// The user closed or cancelled the session.
    Cancelled,
    /// The host dismissed the session (app backgrounded, sheet dismissed).
    Dismissed,
}

impl RedirectResult {
    pub fn is_redirect(&self) -> bool {
        matches!(self, RedirectResult::Redirected { .. })
    }
}

/// Opens an authorization URL and waits for the redirect back to the app.
///
/// iOS hosts typically back this with `ASWebAuthenticationSession`, Android
/// hosts with Custom Tabs plus a deep-link intent filter. The core never
/// inspects the browser itself; it only parses the returned redirect URL.
///
/// # Errors
///
/// Return an error only when the session could not be started at all.
/// User cancellation is [`RedirectResult::Cancelled`], not an error.
#[async_trait]
pub trait AuthorizationPresenter: Send + Sync {
    /// Present `authorize_url` and resolve once the browser reaches a URL
    /// beginning with `redirect_uri`, or the session ends without one.
    async fn present(&self, authorize_url: &str, redirect_uri: &str) -> Result<RedirectResult>;
}
