//! crates/classroom_core/src/error.rs
//!
//! The error taxonomy surfaced by the engine operations.

use uuid::Uuid;

use crate::domain::CompletionRecord;
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Wrong role, or access to another tenant's data.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A completion record already exists for the pair. Carries the recorded result
    /// when it could be loaded, so callers can show it instead of offering a retry.
    #[error("Assessment {assessment_id} was already submitted by student {student_id}")]
    Conflict {
        student_id: Uuid,
        assessment_id: Uuid,
        existing: Option<Box<CompletionRecord>>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    /// A collaborator I/O failure. Nothing was recorded.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The suggestion generator failed. Never fatal to a performance request.
    #[error("Enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),
}

impl EngineError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        EngineError::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}

impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => EngineError::NotFound(what),
            PortError::Unauthorized => EngineError::Unauthorized("access denied".to_string()),
            PortError::Unexpected(msg) => EngineError::Storage(msg),
            PortError::Locked(msg) => EngineError::Validation(msg),
            // Ports report conflicts without the pair; callers that can name it
            // build `EngineError::Conflict` themselves.
            PortError::Conflict(msg) => EngineError::Storage(format!("unexpected conflict: {msg}")),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
