use std::time::Duration;
use thiserror::Error;

/// Failure reported by a host capability (HTTP stack, keychain, browser).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host has no implementation for the capability.
    #[error("Host capability not available: {0}")]
    NotAvailable(String),

    /// The capability exists but the call failed.
    #[error("Host operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
