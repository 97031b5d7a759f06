//! Errors from the output side: sink setup and the param store

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A configured sink could not be opened; the run does not start
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Reading or writing one param store key failed
    #[error("param '{key}': {message}")]
    Param { key: String, message: String },

    /// The param store directory itself is unusable
    #[error("param store io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn param(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Param {
            key: key.into(),
            message: message.into(),
        }
    }
}
