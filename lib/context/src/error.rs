use crate::answer::ExtractionError;
use homefind_core::ErrorKind;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type SessionId = Uuid;

pub type Result<T> = std::result::Result<T, ConversationError>;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error(transparent)]
    Core(#[from] homefind_core::Error),

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Answer extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    #[error("Answer extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversationError::Core(e) => e.kind(),
            ConversationError::EmptyQuestion => ErrorKind::Validation,
            ConversationError::ExtractionTimeout(_) | ConversationError::Extraction(_) => {
                ErrorKind::ExternalCapability
            }
            ConversationError::SessionNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether the same call may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalCapability
    }
}
