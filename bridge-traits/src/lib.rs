//! # Host Bridge Traits
//!
//! Everything the client core needs from the platform, expressed as traits.
//! The core never opens a socket, touches the keychain or launches a browser
//! itself; the host hands it implementations of:
//!
//! - [`HttpClient`](http::HttpClient): requests with a caller-chosen retry policy
//! - [`SecureStore`](storage::SecureStore): encrypted key-value credential storage
//! - [`AuthorizationPresenter`](presenter::AuthorizationPresenter): the browser consent session
//! - [`Clock`](time::Clock): wall time, pinned in tests
//! - [`LoggerSink`](logger::LoggerSink): the host's log pipeline
//!
//! `bridge-desktop` ships the HTTP and keychain implementations for desktop.
//! Mobile hosts bring their own. There is no default presenter anywhere.
//!
//! Implementations report failures as [`BridgeError`] with enough context to
//! debug (key name, URL) and never the secret itself. Every trait is
//! `Send + Sync` so implementations can sit behind `Arc` across tasks.

pub mod error;
pub mod http;
pub mod logger;
pub mod presenter;
pub mod storage;
pub mod time;

pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use presenter::{AuthorizationPresenter, RedirectResult};
pub use storage::SecureStore;
pub use time::{Clock, SystemClock};
