use std::io;

use thiserror::Error;

/// An uploaded file could not be read or parsed into rows.
#[derive(Debug, Error)]
#[error("failed to decode '{file_name}': {reason}")]
pub struct DecodeError {
    pub file_name: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(file_name: impl Into<String>, reason: impl ToString) -> Self {
        DecodeError {
            file_name: file_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure reported by the document store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no stored entry named '{0}'")]
    NotFound(String),
    #[error("invalid document path segment '{0}'")]
    InvalidName(String),
}

/// Error surfaced at a dashboard action boundary (upload, delete, replace, fetch).
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
