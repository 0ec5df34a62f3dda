//! Error taxonomy for the Safety Guard

use thiserror::Error;

/// Errors surfaced by the guard
///
/// Risk escalation is never an error: ALLOW/FLAG/BLOCK are ordinary verdicts.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Rejected before entering the pipeline
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Raised at configuration time, never per message
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External persistence failed; callers continue in memory
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        GuardError::StorageUnavailable(err.to_string())
    }
}

impl From<toml::de::Error> for GuardError {
    fn from(err: toml::de::Error) -> Self {
        GuardError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
