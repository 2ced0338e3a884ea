//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the client core:
//! - Logging and tracing setup ([`logging`])
//! - Configuration and capability injection ([`config`])
//! - Event bus for auth/session transitions ([`events`])
//!
//! ## Overview
//!
//! Nothing in this crate knows about tokens or sessions. It establishes the
//! conventions `core-auth` builds on: every host capability arrives through
//! [`config::CoreConfig`], every transition is broadcast on an
//! [`events::EventBus`], and every crate logs through `tracing`.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, OAuthConfig};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus};
