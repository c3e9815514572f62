use thiserror::Error;

/// Errors raised while assembling the runtime (configuration, logging,
/// bridge wiring). Domain failures have their own enums in the domain crates.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A global `tracing` subscriber was already installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
