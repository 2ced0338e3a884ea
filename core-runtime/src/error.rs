use thiserror::Error;

/// Failures while assembling the runtime: configuration, host capabilities
/// and the logging pipeline. Auth failures live in `core_auth::AuthError`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A bridge was neither injected nor available as a platform default.
    #[error("Missing host capability {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The platform default for a bridge exists but could not be built.
    #[error("Default {capability} unavailable: {message}")]
    DefaultUnavailable {
        capability: &'static str,
        message: String,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
