//! Stream error types.
//!
//! Raised by backends and the adapter; engines convert them into [`ChatError`].

use chat_core::ChatError;
use thiserror::Error;

/// Errors that can occur on the realtime backend or while decoding its records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Malformed record {id}: {reason}")]
    Decode { id: String, reason: String },
}

impl From<StreamError> for ChatError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Write(reason) => ChatError::BackendWrite(reason),
            StreamError::Read(reason) => ChatError::BackendRead(reason),
            decode @ StreamError::Decode { .. } => ChatError::BackendRead(decode.to_string()),
        }
    }
}
