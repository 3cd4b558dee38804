//! Error types for the chat pipeline.

use inookey_core::error::InookeyError;
use inookey_core::validation::ValidationError;

/// Errors from the chat engine and model gateway.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("model service error: {0}")]
    Upstream(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<InookeyError> for ChatError {
    fn from(err: InookeyError) -> Self {
        ChatError::Persistence(err.to_string())
    }
}
