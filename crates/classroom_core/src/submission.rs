//! crates/classroom_core/src/submission.rs
//!
//! Orchestrates one assessment attempt: authorization, deadline check, scoring and
//! the single durable ledger write.
//!
//! Per (student, assessment) pair the workflow moves NotStarted -> Scored -> Recorded.
//! Recorded is terminal: a second submission is reported as a conflict and never
//! overwrites the first.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ActivityKind, CompletionRecord, Identity, RawAnswer, Role};
use crate::error::{EngineError, EngineResult};
use crate::ports::{CatalogStore, LedgerStore, PortError, RosterStore};
use crate::question_bank;
use crate::scoring::{self, ScoreOutcome};

/// What a successful submission returns to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub record: CompletionRecord,
    pub score: f64,
    pub max_score: f64,
    pub correct_count: usize,
    pub total_count: usize,
    pub percentage: f64,
}

impl SubmissionReceipt {
    fn new(record: CompletionRecord, outcome: ScoreOutcome, max_score: f64) -> Self {
        Self {
            record,
            score: outcome.achieved_score,
            max_score,
            correct_count: outcome.correct_count,
            total_count: outcome.total_count,
            percentage: outcome.percentage,
        }
    }
}

/// The externally observable state of a (student, assessment) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionState {
    NotStarted,
    Recorded(CompletionRecord),
}

#[derive(Clone)]
pub struct SubmissionService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    roster: Arc<dyn RosterStore>,
}

impl SubmissionService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LedgerStore>,
        roster: Arc<dyn RosterStore>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            roster,
        }
    }

    pub async fn submit(
        &self,
        identity: &Identity,
        assessment_id: Uuid,
        answers: &HashMap<Uuid, RawAnswer>,
    ) -> EngineResult<SubmissionReceipt> {
        self.submit_at(identity, assessment_id, answers, Utc::now())
            .await
    }

    /// Same as [`submit`](Self::submit) with an explicit submission instant.
    pub async fn submit_at(
        &self,
        identity: &Identity,
        assessment_id: Uuid,
        answers: &HashMap<Uuid, RawAnswer>,
        now: DateTime<Utc>,
    ) -> EngineResult<SubmissionReceipt> {
        if identity.role != Role::Student {
            return Err(EngineError::unauthorized("only students may submit assessments"));
        }
        let student_id = identity.user_id;

        let assessment = self.catalog.get_assessment(assessment_id).await?;
        let student = self.roster.get_student(student_id).await?;
        if assessment.class_id != student.class.id {
            warn!(%student_id, %assessment_id, "Submission for an assessment outside the student's class");
            return Err(EngineError::unauthorized(
                "assessment does not belong to the student's class",
            ));
        }

        // Fast path only; the conditional insert below is what guarantees uniqueness.
        if let Some(existing) = self.ledger.find(student_id, assessment_id).await? {
            return Err(conflict(student_id, assessment_id, Some(existing)));
        }

        let typed = question_bank::interpret_all(&assessment.questions, answers);
        let outcome = scoring::score(&assessment.questions, &typed, assessment.max_score)?;
        let late = assessment.due_at.is_some_and(|due| now > due);

        let record = CompletionRecord {
            id: Uuid::new_v4(),
            student_id,
            assessment_id,
            kind: ActivityKind::Assessment,
            completed_at: now,
            score: Some(outcome.achieved_score),
            max_score: Some(assessment.max_score),
            late,
        };

        let stored = match self.ledger.insert_if_absent(&record).await {
            Ok(stored) => stored,
            Err(PortError::Conflict(_)) => {
                let existing = match self.ledger.find(student_id, assessment_id).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(%student_id, %assessment_id, error = %e, "Could not load the recorded attempt after a conflict");
                        None
                    }
                };
                return Err(conflict(student_id, assessment_id, existing));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            %student_id,
            %assessment_id,
            score = outcome.achieved_score,
            correct = outcome.correct_count,
            total = outcome.total_count,
            late,
            "Submission recorded"
        );
        Ok(SubmissionReceipt::new(stored, outcome, assessment.max_score))
    }

    /// Reports whether the caller's attempt was recorded. Clients that time out on
    /// submit query this instead of resubmitting.
    pub async fn state(
        &self,
        identity: &Identity,
        assessment_id: Uuid,
    ) -> EngineResult<SubmissionState> {
        if identity.role != Role::Student {
            return Err(EngineError::unauthorized("only students have submissions"));
        }
        Ok(match self.ledger.find(identity.user_id, assessment_id).await? {
            Some(record) => SubmissionState::Recorded(record),
            None => SubmissionState::NotStarted,
        })
    }
}

fn conflict(
    student_id: Uuid,
    assessment_id: Uuid,
    existing: Option<CompletionRecord>,
) -> EngineError {
    info!(%student_id, %assessment_id, "Duplicate submission rejected");
    EngineError::Conflict {
        student_id,
        assessment_id,
        existing: existing.map(Box::new),
    }
}
