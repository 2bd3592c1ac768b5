//! crates/classroom_core/src/memory.rs
//!
//! An in-process implementation of every store port. All state lives behind one
//! mutex, which makes `insert_if_absent` atomic in the same way the unique
//! constraint does for the relational adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ActivityKind, Assessment, AssessmentSummary, CompletionRecord, Identity, StudentProfile,
    Subject,
};
use crate::ports::{CatalogStore, LedgerStore, PortError, PortResult, RosterStore, SessionStore};

#[derive(Default)]
struct State {
    assessments: HashMap<Uuid, Assessment>,
    ledger: Vec<CompletionRecord>,
    students: Vec<StudentProfile>,
    guardianships: Vec<(Uuid, Uuid)>,
    subjects: Vec<Subject>,
    sessions: HashMap<String, Identity>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    /// When set, every ledger write fails with `PortError::Unexpected`.
    pub fail_ledger_writes: AtomicBool,
    /// Number of ledger list calls served, for observing aggregation cost.
    pub ledger_reads: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, student: StudentProfile) {
        self.state.lock().await.students.push(student);
    }

    pub async fn add_subject(&self, subject: Subject) {
        self.state.lock().await.subjects.push(subject);
    }

    pub async fn link_guardian(&self, guardian_id: Uuid, student_id: Uuid) {
        self.state
            .lock()
            .await
            .guardianships
            .push((guardian_id, student_id));
    }

    pub async fn add_session(&self, token: &str, identity: Identity) {
        self.state
            .lock()
            .await
            .sessions
            .insert(token.to_string(), identity);
    }

    /// Writes a ledger entry directly, bypassing the conflict check. For seeding.
    pub async fn seed_completion(&self, record: CompletionRecord) {
        self.state.lock().await.ledger.push(record);
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.lock().await.ledger.len()
    }
}

fn newest_first(mut list: Vec<AssessmentSummary>) -> Vec<AssessmentSummary> {
    list.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    list
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_assessment(&self, assessment_id: Uuid) -> PortResult<Assessment> {
        self.state
            .lock()
            .await
            .assessments
            .get(&assessment_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Assessment {} not found", assessment_id)))
    }

    async fn list_assessments_for_class(
        &self,
        class_id: Uuid,
    ) -> PortResult<Vec<AssessmentSummary>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .assessments
                .values()
                .filter(|a| a.class_id == class_id)
                .map(Assessment::summary)
                .collect(),
        ))
    }

    async fn list_assessments_by_author(
        &self,
        teacher_id: Uuid,
    ) -> PortResult<Vec<AssessmentSummary>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .assessments
                .values()
                .filter(|a| a.author_id == teacher_id)
                .map(Assessment::summary)
                .collect(),
        ))
    }

    async fn create_assessment(&self, assessment: &Assessment) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if state.assessments.contains_key(&assessment.id) {
            return Err(PortError::Conflict(format!(
                "Assessment {} already exists",
                assessment.id
            )));
        }
        state.assessments.insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn replace_assessment(&self, assessment: &Assessment) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let attempts = state
            .ledger
            .iter()
            .filter(|r| r.assessment_id == assessment.id)
            .count();
        if attempts > 0 {
            return Err(PortError::Locked(format!(
                "assessment {} already has {attempts} recorded attempt(s)",
                assessment.id
            )));
        }
        match state.assessments.get_mut(&assessment.id) {
            Some(slot) => {
                *slot = assessment.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!(
                "Assessment {} not found",
                assessment.id
            ))),
        }
    }

    async fn delete_assessment(&self, assessment_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if state.assessments.remove(&assessment_id).is_none() {
            return Err(PortError::NotFound(format!(
                "Assessment {} not found",
                assessment_id
            )));
        }
        state.ledger.retain(|r| r.assessment_id != assessment_id);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn insert_if_absent(&self, record: &CompletionRecord) -> PortResult<CompletionRecord> {
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("ledger is unavailable".to_string()));
        }
        let mut state = self.state.lock().await;
        let taken = state.ledger.iter().any(|r| {
            r.student_id == record.student_id && r.assessment_id == record.assessment_id
        });
        if taken {
            return Err(PortError::Conflict(format!(
                "student {} / assessment {}",
                record.student_id, record.assessment_id
            )));
        }
        state.ledger.push(record.clone());
        Ok(record.clone())
    }

    async fn find(
        &self,
        student_id: Uuid,
        assessment_id: Uuid,
    ) -> PortResult<Option<CompletionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .find(|r| r.student_id == student_id && r.assessment_id == assessment_id)
            .cloned())
    }

    async fn list_for_student(
        &self,
        student_id: Uuid,
        kind: ActivityKind,
    ) -> PortResult<Vec<CompletionRecord>> {
        self.ledger_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|r| r.student_id == student_id && r.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_for_assessment_ids(
        &self,
        student_id: Uuid,
        assessment_ids: &[Uuid],
    ) -> PortResult<Vec<CompletionRecord>> {
        self.ledger_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|r| r.student_id == student_id && assessment_ids.contains(&r.assessment_id))
            .cloned()
            .collect())
    }

    async fn count_for_assessment(&self, assessment_id: Uuid) -> PortResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|r| r.assessment_id == assessment_id)
            .count() as u64)
    }
}

#[async_trait]
impl RosterStore for InMemoryStore {
    async fn get_student(&self, student_id: Uuid) -> PortResult<StudentProfile> {
        self.state
            .lock()
            .await
            .students
            .iter()
            .find(|s| s.id == student_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Student {} not found", student_id)))
    }

    async fn list_student_ids_in_class(&self, class_id: Uuid) -> PortResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .students
            .iter()
            .filter(|s| s.class.id == class_id)
            .map(|s| s.id)
            .collect())
    }

    async fn list_children(&self, guardian_id: Uuid) -> PortResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .guardianships
            .iter()
            .filter(|(guardian, _)| *guardian == guardian_id)
            .map(|(_, student)| *student)
            .collect())
    }

    async fn list_subjects_for_class(&self, class_id: Uuid) -> PortResult<Vec<Subject>> {
        let state = self.state.lock().await;
        Ok(state
            .subjects
            .iter()
            .filter(|s| s.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn teaches_class(&self, teacher_id: Uuid, class_id: Uuid) -> PortResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .subjects
            .iter()
            .any(|s| s.class_id == class_id && s.teacher_id == teacher_id))
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn resolve_session(&self, token: &str) -> PortResult<Identity> {
        self.state
            .lock()
            .await
            .sessions
            .get(token)
            .copied()
            .ok_or(PortError::Unauthorized)
    }
}
