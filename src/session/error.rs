use thiserror::Error;

use super::SessionState;

/// Failures surfaced to the caller of a session operation. None of them
/// move the state machine; the user retries from the current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot {action} while the session is {}", state.as_str())]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    #[error("quiz generation failed: {0}")]
    Generation(String),
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> Self {
        SessionError::Validation(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Generation(_))
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
