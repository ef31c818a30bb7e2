use thiserror::Error;

/// Errors surfaced by the chat engines to their caller.
///
/// Cloneable so an engine can keep the most recent one as passive state for display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Append or patch failed (network, permission, malformed data). Retry is up to the caller.
    #[error("Backend write error: {0}")]
    BackendWrite(String),

    /// Subscription failed or was dropped. The engine does not retry on its own.
    #[error("Backend read error: {0}")]
    BackendRead(String),

    /// Rejected before any backend call (empty body, missing identity fields).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Moderation attempted without a moderator identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Target message is not in the locally known window.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ChatError {
    /// True when the error was raised locally and never reached the backend.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_) | ChatError::Unauthorized(_) | ChatError::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
