//! Runtime error type shared by configuration, logging and the event bus.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is missing or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host bridge was not injected
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn capability_missing(capability: &str, message: impl Into<String>) -> Self {
        Error::CapabilityMissing {
            capability: capability.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
