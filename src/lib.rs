//! Workspace facade crate.
//!
//! Re-exports the client core crates and maps the `desktop-shims` feature
//! onto `core-runtime`, so a host application can depend on
//! `spotify-client-workspace` alone and get working desktop defaults for
//! HTTP and secure storage.

pub use core_auth;
pub use core_runtime;
