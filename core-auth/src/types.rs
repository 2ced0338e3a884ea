use serde::{Deserialize, Serialize};
use std::fmt;

/// OAuth 2.0 token set for the signed-in user.
///
/// `expires_at` is an absolute deadline in Unix epoch milliseconds, computed
/// once at acquisition time from the grant's `expires_in`. Persisted records
/// use camelCase keys.
///
/// # Security
///
/// Tokens must never be logged. The `Debug` implementation redacts them.
///
/// # Examples
///
/// ```
/// use core_auth::TokenSet;
///
/// let now = 1_700_000_000_000;
/// let tokens = TokenSet::from_grant("A1", "R1", "Bearer", "user-read-email", 3600, now);
///
/// assert_eq!(tokens.expires_at, now + 3_600_000);
/// assert!(!tokens.needs_refresh(now, 300_000));
/// assert!(tokens.needs_refresh(now + 3_300_000, 300_000));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Space-delimited granted scopes
    pub scope: String,
    /// Unix epoch milliseconds
    pub expires_at: i64,
}

impl TokenSet {
    /// Build a token set from a grant response received at `now_millis`.
    pub fn from_grant(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: impl Into<String>,
        scope: impl Into<String>,
        expires_in_secs: i64,
        now_millis: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: token_type.into(),
            scope: scope.into(),
            expires_at: now_millis.saturating_add(expires_in_secs.saturating_mul(1000)),
        }
    }

    /// True once `now_millis` has reached the deadline.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    /// True when the token is within `buffer_millis` of its deadline.
    pub fn needs_refresh(&self, now_millis: i64, buffer_millis: i64) -> bool {
        now_millis >= self.expires_at.saturating_sub(buffer_millis)
    }

    /// Both tokens are present. A persisted record failing this is treated
    /// as absent.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Profile image as returned by the Web API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileImage {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// The signed-in user, from `GET /v1/me`.
///
/// Stored as the API returned it (snake_case keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Present only when the `user-read-email` scope was granted
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<ProfileImage>>,
    #[serde(default)]
    pub country: Option<String>,
    /// Subscription level ("premium", "free")
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl UserProfile {
    /// Display name, falling back to the user id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// First (largest) image URL, if any.
    pub fn avatar_url(&self) -> Option<&str> {
        self.images
            .as_ref()
            .and_then(|images| images.first())
            .map(|image| image.url.as_str())
    }
}

/// Authoritative in-memory session, published by the session manager.
///
/// Invariants: `is_authenticated` implies `tokens.is_some()`, and
/// `user.is_some()` implies `tokens.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub tokens: Option<TokenSet>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    /// User-facing message for the last failed operation
    pub error: Option<String>,
}

impl SessionState {
    /// Fully signed-out state with no pending work.
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn authenticated(tokens: TokenSet, user: Option<UserProfile>) -> Self {
        Self {
            user,
            tokens: Some(tokens),
            is_authenticated: true,
            is_loading: false,
            error: None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    /// Checks the invariants listed on the type.
    pub fn is_consistent(&self) -> bool {
        let has_tokens = self.tokens.is_some();
        (!self.is_authenticated || has_tokens) && (self.user.is_none() || has_tokens)
    }
}
