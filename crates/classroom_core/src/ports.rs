//! crates/classroom_core/src/ports.rs
//!
//! Defines the service contracts (traits) the engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the relational store, the auth provider and the AI endpoint.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ActivityKind, Assessment, AssessmentSummary, CompletionRecord, Identity,
    ReinforcementPlan, StudentProfile, Subject, SuggestionRequest,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    /// The write was refused because dependent records already exist.
    #[error("Write refused: {0}")]
    Locked(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read/write access to assessments and their questions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads an assessment together with its authoritative answer keys.
    async fn get_assessment(&self, assessment_id: Uuid) -> PortResult<Assessment>;

    async fn list_assessments_for_class(&self, class_id: Uuid)
        -> PortResult<Vec<AssessmentSummary>>;

    async fn list_assessments_by_author(&self, teacher_id: Uuid)
        -> PortResult<Vec<AssessmentSummary>>;

    async fn create_assessment(&self, assessment: &Assessment) -> PortResult<()>;

    /// Replaces metadata and the whole question set in one step.
    ///
    /// Refuses with `PortError::Locked` when any ledger entry references the
    /// assessment. The check and the write must be atomic with respect to
    /// `LedgerStore::insert_if_absent`.
    async fn replace_assessment(&self, assessment: &Assessment) -> PortResult<()>;

    /// Deletes the assessment, its questions and every ledger entry that references it.
    async fn delete_assessment(&self, assessment_id: Uuid) -> PortResult<()>;
}

/// The append-only record of finished attempts.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Writes `record` unless one already exists for its (student, assessment) pair.
    ///
    /// Must be a single atomic conditional write. An existing pair yields
    /// `PortError::Conflict`.
    async fn insert_if_absent(&self, record: &CompletionRecord) -> PortResult<CompletionRecord>;

    async fn find(
        &self,
        student_id: Uuid,
        assessment_id: Uuid,
    ) -> PortResult<Option<CompletionRecord>>;

    async fn list_for_student(
        &self,
        student_id: Uuid,
        kind: ActivityKind,
    ) -> PortResult<Vec<CompletionRecord>>;

    async fn list_for_assessment_ids(
        &self,
        student_id: Uuid,
        assessment_ids: &[Uuid],
    ) -> PortResult<Vec<CompletionRecord>>;

    async fn count_for_assessment(&self, assessment_id: Uuid) -> PortResult<u64>;
}

/// Classes, students, guardians and the subjects taught in each class.
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn get_student(&self, student_id: Uuid) -> PortResult<StudentProfile>;

    async fn list_student_ids_in_class(&self, class_id: Uuid) -> PortResult<Vec<Uuid>>;

    /// Students linked to a guardian, in enrollment order.
    async fn list_children(&self, guardian_id: Uuid) -> PortResult<Vec<Uuid>>;

    async fn list_subjects_for_class(&self, class_id: Uuid) -> PortResult<Vec<Subject>>;

    async fn teaches_class(&self, teacher_id: Uuid, class_id: Uuid) -> PortResult<bool>;
}

/// Resolves an auth-provider session token to the caller's identity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve_session(&self, token: &str) -> PortResult<Identity>;
}

/// Optional generative enrichment of a performance snapshot.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> PortResult<ReinforcementPlan>;
}
