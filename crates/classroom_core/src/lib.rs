pub mod authoring;
pub mod domain;
pub mod error;
pub mod memory;
pub mod performance;
pub mod ports;
pub mod question_bank;
pub mod ranking;
pub mod scoring;
pub mod submission;

pub use domain::{
    ActivityKind, AnswerKey, Assessment, AssessmentSummary, ClassInfo, CompletionRecord,
    Identity, Question, QuestionVariant, RawAnswer, ReinforcementPlan, Role, StudentProfile,
    Subject, SubjectSuggestion, SubmittedAnswer, SuggestionRequest,
};
pub use error::{EngineError, EngineResult};
pub use ports::{
    CatalogStore, LedgerStore, PortError, PortResult, RosterStore, SessionStore,
    SuggestionService,
};
