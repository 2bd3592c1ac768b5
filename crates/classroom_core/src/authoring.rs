//! crates/classroom_core/src/authoring.rs
//!
//! Teacher-side assessment lifecycle plus the role-scoped catalog reads.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Assessment, AssessmentSummary, CompletionRecord, Identity, Role};
use crate::error::{EngineError, EngineResult};
use crate::ports::{CatalogStore, LedgerStore, RosterStore};
use crate::question_bank::{self, QuestionDraft, QuestionView};

/// An assessment as submitted by its author.
#[derive(Debug, Clone)]
pub struct AssessmentDraft {
    pub title: String,
    pub description: Option<String>,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub max_score: f64,
    pub questions: Vec<QuestionDraft>,
}

/// One entry of a catalog listing. Students also see their own completion.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentListing {
    pub assessment: AssessmentSummary,
    pub completion: Option<CompletionRecord>,
}

#[derive(Clone)]
pub struct AuthoringService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    roster: Arc<dyn RosterStore>,
}

impl AuthoringService {
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

    pub async fn create(
        &self,
        identity: &Identity,
        draft: AssessmentDraft,
    ) -> EngineResult<Assessment> {
        require_teacher(identity)?;
        self.check_subject(identity, draft.class_id, draft.subject_id)
            .await?;
        let assessment = build(Uuid::new_v4(), identity.user_id, Utc::now(), draft)?;
        self.catalog.create_assessment(&assessment).await?;
        info!(assessment_id = %assessment.id, author = %identity.user_id, "Assessment created");
        Ok(assessment)
    }

    /// Replaces an assessment's metadata and its whole question set.
    ///
    /// Refused once any attempt is recorded, so historical grades always refer to
    /// the questions that produced them.
    pub async fn update(
        &self,
        identity: &Identity,
        assessment_id: Uuid,
        draft: AssessmentDraft,
    ) -> EngineResult<Assessment> {
        require_teacher(identity)?;
        let current = self.catalog.get_assessment(assessment_id).await?;
        require_author(identity, &current)?;
        self.check_subject(identity, draft.class_id, draft.subject_id)
            .await?;

        // Early refusal with a clear message; `replace_assessment` repeats the check
        // atomically with the write.
        let attempts = self.ledger.count_for_assessment(assessment_id).await?;
        if attempts > 0 {
            return Err(EngineError::validation(format!(
                "assessment {assessment_id} already has {attempts} recorded attempt(s) and can no longer be edited"
            )));
        }

        let assessment = build(assessment_id, current.author_id, current.published_at, draft)?;
        self.catalog.replace_assessment(&assessment).await?;
        info!(%assessment_id, "Assessment replaced");
        Ok(assessment)
    }

    /// Deletes an assessment together with its questions and completion records.
    pub async fn delete(&self, identity: &Identity, assessment_id: Uuid) -> EngineResult<()> {
        require_teacher(identity)?;
        let current = self.catalog.get_assessment(assessment_id).await?;
        require_author(identity, &current)?;
        self.catalog.delete_assessment(assessment_id).await?;
        info!(%assessment_id, "Assessment deleted");
        Ok(())
    }

    /// Lists assessments visible to the caller, newest first.
    pub async fn list(&self, identity: &Identity) -> EngineResult<Vec<AssessmentListing>> {
        match identity.role {
            Role::Teacher => Ok(self
                .catalog
                .list_assessments_by_author(identity.user_id)
                .await?
                .into_iter()
                .map(|assessment| AssessmentListing {
                    assessment,
                    completion: None,
                })
                .collect()),
            Role::Student => {
                let student = self.roster.get_student(identity.user_id).await?;
                let assessments = self
                    .catalog
                    .list_assessments_for_class(student.class.id)
                    .await?;
                let ids: Vec<Uuid> = assessments.iter().map(|a| a.id).collect();
                let records = self
                    .ledger
                    .list_for_assessment_ids(identity.user_id, &ids)
                    .await?;
                Ok(assessments
                    .into_iter()
                    .map(|assessment| {
                        let completion = records
                            .iter()
                            .find(|r| r.assessment_id == assessment.id)
                            .cloned();
                        AssessmentListing {
                            assessment,
                            completion,
                        }
                    })
                    .collect())
            }
            Role::Guardian => Err(EngineError::unauthorized(
                "guardians do not have an assessment catalog",
            )),
        }
    }

    /// The questions of an assessment, projected for the caller's role.
    pub async fn questions(
        &self,
        identity: &Identity,
        assessment_id: Uuid,
    ) -> EngineResult<Vec<QuestionView>> {
        let assessment = self.catalog.get_assessment(assessment_id).await?;
        let allowed = match identity.role {
            Role::Student => {
                self.roster.get_student(identity.user_id).await?.class.id == assessment.class_id
            }
            Role::Teacher => {
                assessment.author_id == identity.user_id
                    || self
                        .roster
                        .teaches_class(identity.user_id, assessment.class_id)
                        .await?
            }
            Role::Guardian => {
                let mut linked = false;
                for child in self.roster.list_children(identity.user_id).await? {
                    if self.roster.get_student(child).await?.class.id == assessment.class_id {
                        linked = true;
                        break;
                    }
                }
                linked
            }
        };
        if !allowed {
            return Err(EngineError::unauthorized(
                "assessment is outside the caller's classes",
            ));
        }

        Ok(assessment
            .questions
            .iter()
            .map(|q| question_bank::project(q, identity.role))
            .collect())
    }

    async fn check_subject(
        &self,
        identity: &Identity,
        class_id: Uuid,
        subject_id: Uuid,
    ) -> EngineResult<()> {
        let subjects = self.roster.list_subjects_for_class(class_id).await?;
        let subject = subjects
            .iter()
            .find(|s| s.id == subject_id)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "subject {subject_id} is not taught in class {class_id}"
                ))
            })?;
        if subject.teacher_id != identity.user_id {
            return Err(EngineError::unauthorized("teacher does not teach this subject"));
        }
        Ok(())
    }
}

fn require_teacher(identity: &Identity) -> EngineResult<()> {
    if identity.role != Role::Teacher {
        return Err(EngineError::unauthorized("only teachers may author assessments"));
    }
    Ok(())
}

fn require_author(identity: &Identity, assessment: &Assessment) -> EngineResult<()> {
    if assessment.author_id != identity.user_id {
        return Err(EngineError::unauthorized(
            "only the author may change this assessment",
        ));
    }
    Ok(())
}

fn build(
    id: Uuid,
    author_id: Uuid,
    published_at: DateTime<Utc>,
    draft: AssessmentDraft,
) -> EngineResult<Assessment> {
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(EngineError::validation("title must not be empty"));
    }
    if !draft.max_score.is_finite() || draft.max_score <= 0.0 {
        return Err(EngineError::validation("max score must be a positive number"));
    }
    if draft.questions.is_empty() {
        return Err(EngineError::validation(
            "an assessment must have at least one question",
        ));
    }
    let questions = draft
        .questions
        .into_iter()
        .map(question_bank::build_question)
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(Assessment {
        id,
        title,
        description: draft.description.filter(|d| !d.trim().is_empty()),
        subject_id: draft.subject_id,
        class_id: draft.class_id,
        author_id,
        published_at,
        due_at: draft.due_at,
        max_score: draft.max_score,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityKind, ClassInfo, RawAnswer, StudentProfile, Subject};
    use crate::memory::InMemoryStore;
    use crate::ports::PortResult;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: AuthoringService,
        teacher: Identity,
        student: Identity,
        class_id: Uuid,
        subject_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let class_id = Uuid::new_v4();
        let subject_id = Uuid::new_v4();
        let teacher = Identity::new(Uuid::new_v4(), Role::Teacher);
        let student = Identity::new(Uuid::new_v4(), Role::Student);
        store
            .add_subject(Subject {
                id: subject_id,
                name: "Matemática".to_string(),
                class_id,
                teacher_id: teacher.user_id,
            })
            .await;
        store
            .add_student(StudentProfile {
                id: student.user_id,
                name: "Bia".to_string(),
                email: "bia@escola.br".to_string(),
                enrollment: "2024002".to_string(),
                class: ClassInfo {
                    id: class_id,
                    name: "8B".to_string(),
                    grade: "8º ano".to_string(),
                },
            })
            .await;
        let service = AuthoringService::new(store.clone(), store.clone(), store.clone());
        Fixture {
            store,
            service,
            teacher,
            student,
            class_id,
            subject_id,
        }
    }

    fn draft(f: &Fixture) -> AssessmentDraft {
        AssessmentDraft {
            title: "Frações".to_string(),
            description: Some("Prova 1".to_string()),
            class_id: f.class_id,
            subject_id: f.subject_id,
            due_at: None,
            max_score: 10.0,
            questions: vec![QuestionDraft {
                prompt: "1/2 + 1/2".to_string(),
                variant: "multipla-escolha".to_string(),
                options: Some(vec!["1".into(), "2".into()]),
                correct: RawAnswer::Selection(vec!["1".into()]),
            }],
        }
    }

    #[tokio::test]
    async fn teacher_creates_and_lists() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();
        let listed = f.service.list(&f.teacher).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].assessment.id, created.id);
    }

    #[tokio::test]
    async fn students_cannot_author() {
        let f = fixture().await;
        let err = f.service.create(&f.student, draft(&f)).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn zero_question_assessment_is_rejected() {
        let f = fixture().await;
        let mut d = draft(&f);
        d.questions.clear();
        assert!(matches!(
            f.service.create(&f.teacher, d).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn teacher_of_another_subject_is_rejected() {
        let f = fixture().await;
        let stranger = Identity::new(Uuid::new_v4(), Role::Teacher);
        assert!(matches!(
            f.service.create(&stranger, draft(&f)).await,
            Err(EngineError::Unauthorized(_))
        ));
    }

    /// Commits an attempt right after reporting the count, the way a submission
    /// racing with an edit would.
    struct AttemptAfterCount {
        store: Arc<InMemoryStore>,
        student_id: Uuid,
    }

    #[async_trait::async_trait]
    impl LedgerStore for AttemptAfterCount {
        async fn insert_if_absent(
            &self,
            record: &CompletionRecord,
        ) -> PortResult<CompletionRecord> {
            self.store.insert_if_absent(record).await
        }

        async fn find(
            &self,
            student_id: Uuid,
            assessment_id: Uuid,
        ) -> PortResult<Option<CompletionRecord>> {
            self.store.find(student_id, assessment_id).await
        }

        async fn list_for_student(
            &self,
            student_id: Uuid,
            kind: ActivityKind,
        ) -> PortResult<Vec<CompletionRecord>> {
            self.store.list_for_student(student_id, kind).await
        }

        async fn list_for_assessment_ids(
            &self,
            student_id: Uuid,
            assessment_ids: &[Uuid],
        ) -> PortResult<Vec<CompletionRecord>> {
            self.store.list_for_assessment_ids(student_id, assessment_ids).await
        }

        async fn count_for_assessment(&self, assessment_id: Uuid) -> PortResult<u64> {
            let count = self.store.count_for_assessment(assessment_id).await?;
            self.store
                .seed_completion(CompletionRecord {
                    id: Uuid::new_v4(),
                    student_id: self.student_id,
                    assessment_id,
                    kind: ActivityKind::Assessment,
                    completed_at: Utc::now(),
                    score: Some(10.0),
                    max_score: Some(10.0),
                    late: false,
                })
                .await;
            Ok(count)
        }
    }

    #[tokio::test]
    async fn attempt_landing_mid_edit_still_blocks_the_edit() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();
        let ledger = Arc::new(AttemptAfterCount {
            store: f.store.clone(),
            student_id: f.student.user_id,
        });
        let service = AuthoringService::new(f.store.clone(), ledger, f.store.clone());

        let mut changed = draft(&f);
        changed.max_score = 50.0;
        let err = service
            .update(&f.teacher, created.id, changed)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(f.store.count_for_assessment(created.id).await.unwrap(), 1);
        let stored = f.store.get_assessment(created.id).await.unwrap();
        assert_eq!(stored.max_score, 10.0);
    }

    #[tokio::test]
    async fn edits_are_refused_after_an_attempt() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();
        f.store
            .seed_completion(CompletionRecord {
                id: Uuid::new_v4(),
                student_id: f.student.user_id,
                assessment_id: created.id,
                kind: ActivityKind::Assessment,
                completed_at: Utc::now(),
                score: Some(10.0),
                max_score: Some(10.0),
                late: false,
            })
            .await;

        let err = f
            .service
            .update(&f.teacher, created.id, draft(&f))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_the_ledger() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();
        f.store
            .seed_completion(CompletionRecord {
                id: Uuid::new_v4(),
                student_id: f.student.user_id,
                assessment_id: created.id,
                kind: ActivityKind::Assessment,
                completed_at: Utc::now(),
                score: Some(5.0),
                max_score: Some(10.0),
                late: true,
            })
            .await;

        f.service.delete(&f.teacher, created.id).await.unwrap();
        assert_eq!(f.store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn students_see_questions_without_keys() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();

        let student_view = f.service.questions(&f.student, created.id).await.unwrap();
        assert!(student_view.iter().all(|q| q.key.is_none()));

        let teacher_view = f.service.questions(&f.teacher, created.id).await.unwrap();
        assert!(teacher_view.iter().all(|q| q.key.is_some()));
    }

    #[tokio::test]
    async fn student_listing_carries_own_completion() {
        let f = fixture().await;
        let created = f.service.create(&f.teacher, draft(&f)).await.unwrap();
        let listed = f.service.list(&f.student).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].completion.is_none());

        f.store
            .seed_completion(CompletionRecord {
                id: Uuid::new_v4(),
                student_id: f.student.user_id,
                assessment_id: created.id,
                kind: ActivityKind::Assessment,
                completed_at: Utc::now(),
                score: Some(7.0),
                max_score: Some(10.0),
                late: false,
            })
            .await;
        let listed = f.service.list(&f.student).await.unwrap();
        assert_eq!(listed[0].completion.as_ref().and_then(|c| c.score), Some(7.0));
    }
}
