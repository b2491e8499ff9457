use serde::Serialize;
use thiserror::Error;

/// Error returned by every fallible control operation. Carries only a message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct Failure {
    message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::new(format!("I/O error: {}", e))
    }
}

/// Result type alias for control operations
pub type Outcome<T> = std::result::Result<T, Failure>;
