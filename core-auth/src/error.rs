use thiserror::Error;

/// Message shown when sign-in is attempted before a request was prepared.
pub const AUTH_NOT_READY_MESSAGE: &str = "Authentication not ready. Please try again.";
pub const PROFILE_FETCH_MESSAGE: &str = "Failed to get user profile";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";
pub const TOKEN_EXCHANGE_FAILED_MESSAGE: &str = "Token exchange failed";
pub const TOKEN_REFRESH_FAILED_MESSAGE: &str = "Token refresh failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication not ready. Please try again.")]
    AuthNotReady,

    #[error("Sign-in already in progress")]
    SignInInProgress,

    /// The provider redirected back with an error, or the redirect could
    /// not be trusted (missing code, state mismatch).
    #[error("Authentication failed: {0}")]
    Authorization(String),

    /// The host could not open the browser session.
    #[error("Authorization presenter failed: {0}")]
    Presenter(String),

    #[error("{0}")]
    TokenExchange(String),

    #[error("{0}")]
    TokenRefresh(String),

    #[error("Failed to get user profile: {message}")]
    ProfileFetch {
        status: Option<u16>,
        message: String,
    },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Secure storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether trying again later can succeed without the user signing in anew.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::AuthNotReady
                | AuthError::SignInInProgress
                | AuthError::Presenter(_)
                | AuthError::Network(_)
                | AuthError::ProfileFetch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
