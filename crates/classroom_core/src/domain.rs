//! crates/classroom_core/src/domain.rs
//!
//! Defines the pure, core data structures for the assessment engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

//=========================================================================================
// Identity
//=========================================================================================

/// The three actor roles the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Teacher,
    Guardian,
}

impl Role {
    /// The tag used by the auth provider's session table.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Role::Student => "aluno",
            Role::Teacher => "professor",
            Role::Guardian => "responsavel",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "aluno" => Some(Role::Student),
            "professor" => Some(Role::Teacher),
            "responsavel" => Some(Role::Guardian),
            _ => None,
        }
    }
}

/// The authenticated caller. Every engine operation receives one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

//=========================================================================================
// Question Bank
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionVariant {
    SingleSelect,
    Boolean,
    FreeText,
}

impl QuestionVariant {
    pub fn as_tag(&self) -> &'static str {
        match self {
            QuestionVariant::SingleSelect => "multipla-escolha",
            QuestionVariant::Boolean => "verdadeiro-falso",
            QuestionVariant::FreeText => "resposta-curta",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "multipla-escolha" => Some(QuestionVariant::SingleSelect),
            "verdadeiro-falso" => Some(QuestionVariant::Boolean),
            "resposta-curta" => Some(QuestionVariant::FreeText),
            _ => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        !matches!(self, QuestionVariant::FreeText)
    }
}

/// The authoritative correct answer of a question.
///
/// Choice variants hold a non-empty subset of the option set; free text holds a
/// single trimmed, lowercased string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Options(BTreeSet<String>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub prompt: String,
    pub variant: QuestionVariant,
    pub options: Vec<String>,
    pub key: AnswerKey,
}

/// An answer exactly as the client sent it, before it is checked against the
/// question it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAnswer {
    Selection(Vec<String>),
    Text(String),
}

/// A shape-validated answer, tagged by the variant of the question it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedAnswer {
    SingleSelect(String),
    BooleanChoice(String),
    FreeText(String),
}

//=========================================================================================
// Assessments
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub author_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub max_score: f64,
    pub questions: Vec<Question>,
}

impl Assessment {
    pub fn summary(&self) -> AssessmentSummary {
        AssessmentSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            subject_id: self.subject_id,
            class_id: self.class_id,
            author_id: self.author_id,
            published_at: self.published_at,
            due_at: self.due_at,
            max_score: self.max_score,
        }
    }
}

/// An assessment without its questions, as listed in catalogs.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub author_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub max_score: f64,
}

//=========================================================================================
// Completion Ledger
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Lesson,
    Assessment,
}

impl ActivityKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ActivityKind::Lesson => "aula",
            ActivityKind::Assessment => "avaliacao",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "aula" => Some(ActivityKind::Lesson),
            "avaliacao" => Some(ActivityKind::Assessment),
            _ => None,
        }
    }
}

/// An immutable ledger entry for one finished attempt.
///
/// `max_score` is a snapshot taken at submission time, never dereferenced later.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub kind: ActivityKind,
    pub completed_at: DateTime<Utc>,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub late: bool,
}

impl CompletionRecord {
    /// The `(score, max_score)` pair when the record carries a grade.
    pub fn graded(&self) -> Option<(f64, f64)> {
        match (self.score, self.max_score) {
            (Some(score), Some(max)) => Some((score, max)),
            _ => None,
        }
    }
}

//=========================================================================================
// Roster
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: Uuid,
    pub name: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub enrollment: String,
    pub class: ClassInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub class_id: Uuid,
    pub teacher_id: Uuid,
}

//=========================================================================================
// Reinforcement Suggestions
//=========================================================================================

/// One under-performing subject handed to the suggestion generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectShortfall {
    pub subject_name: String,
    pub score: i64,
    pub average_score: f64,
    pub completion_rate: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    pub student_name: String,
    pub grade: String,
    pub subjects: Vec<SubjectShortfall>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSuggestion {
    pub subject: String,
    pub diagnosis: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub goal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReinforcementPlan {
    pub suggestions: Vec<SubjectSuggestion>,
    pub general_tips: Vec<String>,
}
