//! # Authentication Module
//!
//! OAuth 2.0 Authorization Code + PKCE session lifecycle for the Spotify
//! accounts service.
//!
//! ## Overview
//!
//! - [`credential_store`]: persisted token and user records, expiry-aware reads
//! - [`exchange`]: token endpoint client with single-flight refresh
//! - [`flow`]: interactive sign-in state machine
//! - [`session`]: the authoritative [`SessionState`]
//! - [`api`]: bearer-authorized Web API requests
//! - [`manager`]: [`AuthManager`], wiring all of the above from a `CoreConfig`
//!
//! Host platforms supply the browser session, secure storage and HTTP stack
//! through the `bridge-traits` crate.

pub mod api;
pub mod credential_store;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod manager;
pub mod pkce;
pub mod profile;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use credential_store::{CredentialStore, TokenRefresher};
pub use error::{AuthError, Result};
pub use exchange::TokenExchangeClient;
pub use flow::{AuthRequest, AuthorizationFlow, FlowOutcome, FlowState};
pub use manager::AuthManager;
pub use pkce::PkceVerifier;
pub use profile::ProfileClient;
pub use session::SessionManager;
pub use types::{ProfileImage, SessionState, TokenSet, UserProfile};
