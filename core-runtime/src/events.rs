//! # Event Bus
//!
//! Typed notifications fanned out over `tokio::sync::broadcast`.
//!
//! The session manager's watch channel (see `core_auth::session`) is what the
//! UI renders from. The bus only reports *transitions*, so analytics hooks,
//! host logging and toasts can react to sign-in, refresh and sign-out without
//! holding a session handle.
//!
//! ```text
//!  SessionManager ──┐                    ┌──> subscriber
//!  TokenExchange  ──┼── emit ──> EventBus ┼──> subscriber
//!  AuthFlow       ──┘                    └──> subscriber
//! ```
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut events = bus.subscribe();
//!
//! let _ = bus.emit(CoreEvent::Auth(AuthEvent::SigningIn));
//!
//! assert_eq!(events.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::SigningIn));
//! # }
//! ```
//!
//! A receiver that falls behind by more than the capacity gets
//! [`RecvError::Lagged`] and continues from the oldest retained event.
//! Publishers ignore the error returned when nobody is subscribed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Capacity used by [`EventBus::default`].
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
}

impl From<AuthEvent> for CoreEvent {
    fn from(event: AuthEvent) -> Self {
        CoreEvent::Auth(event)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignOutReason {
    /// The user asked to log out.
    UserInitiated,
    /// The refresh token was rejected, or refresh failed.
    RefreshFailed,
    /// Startup found no usable credentials or the profile check failed.
    BootstrapFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Credentials were cleared and the session is logged out.
    SignedOut { reason: SignOutReason },
    /// An interactive authorization session was opened.
    SigningIn,
    SignInCancelled,
    /// Tokens were acquired (or restored) and the session is authenticated.
    SignedIn {
        /// Spotify user id, empty when the profile could not be loaded
        user_id: String,
    },
    TokenRefreshing,
    TokenRefreshed {
        /// New access token deadline, Unix epoch milliseconds
        expires_at: i64,
    },
    AuthError {
        message: String,
        /// `false` when the session was ended because of the error
        recoverable: bool,
    },
}

impl AuthEvent {
    /// Whether this event means a signed-in session now exists or ended.
    pub fn changes_session(&self) -> bool {
        matches!(self, AuthEvent::SignedIn { .. } | AuthEvent::SignedOut { .. })
    }
}

/// Cloneable handle to the broadcast channel. Every clone publishes to the
/// same subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers were sent the event, or `SendError` if
    /// there are none.
    pub fn emit(&self, event: impl Into<CoreEvent>) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event.into())
    }

    /// Past events are not replayed to new subscribers.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_in(user_id: &str) -> CoreEvent {
        CoreEvent::Auth(AuthEvent::SignedIn {
            user_id: user_id.to_string(),
        })
    }

    #[test]
    fn test_emit_with_nobody_listening() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(AuthEvent::SigningIn).is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_each_event() {
        let bus = EventBus::new(8);
        let mut ui = bus.subscribe();
        let mut analytics = bus.subscribe();

        assert_eq!(bus.emit(signed_in("wizzler")).unwrap(), 2);

        assert_eq!(ui.recv().await.unwrap(), signed_in("wizzler"));
        assert_eq!(analytics.recv().await.unwrap(), signed_in("wizzler"));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(8);
        let _early = bus.subscribe();
        bus.emit(AuthEvent::TokenRefreshing).unwrap();

        let mut late = bus.subscribe();
        bus.emit(AuthEvent::TokenRefreshed { expires_at: 42 }).unwrap();

        assert_eq!(
            late.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed { expires_at: 42 })
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();

        for n in 0..5 {
            bus.emit(signed_in(&format!("user-{}", n))).unwrap();
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(slow.recv().await.unwrap(), signed_in("user-3"));
    }

    #[test]
    fn test_session_changing_events() {
        assert!(AuthEvent::SignedOut {
            reason: SignOutReason::UserInitiated
        }
        .changes_session());
        assert!(!AuthEvent::SignInCancelled.changes_session());
        assert!(!AuthEvent::AuthError {
            message: "Token refresh failed".to_string(),
            recoverable: false,
        }
        .changes_session());
    }

    #[test]
    fn test_wire_shape() {
        let event = CoreEvent::Auth(AuthEvent::SignedOut {
            reason: SignOutReason::RefreshFailed,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "Auth",
                "payload": { "event": "SignedOut", "reason": "RefreshFailed" }
            })
        );
        assert_eq!(serde_json::from_value::<CoreEvent>(json).unwrap(), event);
    }
}
