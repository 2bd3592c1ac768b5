//! End-to-end flows through submission, aggregation and ranking over the in-memory stores.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use classroom_core::{
    memory::InMemoryStore,
    performance::PerformanceService,
    ports::{CatalogStore, PortError, PortResult, SuggestionService},
    ranking::LinearScanRanking,
    submission::SubmissionService,
    AnswerKey, Assessment, ClassInfo, EngineError, Identity, Question, QuestionVariant,
    RawAnswer, ReinforcementPlan, Role, StudentProfile, Subject, SubjectSuggestion,
    SuggestionRequest,
};
use uuid::Uuid;

/// Records every request and answers with a fixed plan, or fails when told to.
#[derive(Default)]
struct ScriptedSuggestions {
    fail: bool,
    seen: Mutex<Vec<SuggestionRequest>>,
}

#[async_trait]
impl SuggestionService for ScriptedSuggestions {
    async fn suggest(&self, request: &SuggestionRequest) -> PortResult<ReinforcementPlan> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }
        if self.fail {
            return Err(PortError::Unexpected("generator offline".to_string()));
        }
        Ok(ReinforcementPlan {
            suggestions: request
                .subjects
                .iter()
                .map(|s| SubjectSuggestion {
                    subject: s.subject_name.clone(),
                    diagnosis: "poucas entregas".to_string(),
                    actions: vec!["revisar".to_string()],
                    resources: vec![],
                    goal: "chegar a 70".to_string(),
                })
                .collect(),
            general_tips: vec!["criar uma rotina".to_string()],
        })
    }
}

struct School {
    store: Arc<InMemoryStore>,
    class_id: Uuid,
    teacher_id: Uuid,
    math: Subject,
    history: Subject,
    students: Vec<Uuid>,
}

async fn school(student_count: usize) -> School {
    let store = Arc::new(InMemoryStore::new());
    let class_id = Uuid::new_v4();
    let teacher_id = Uuid::new_v4();
    let math = Subject {
        id: Uuid::new_v4(),
        name: "Matemática".to_string(),
        class_id,
        teacher_id,
    };
    let history = Subject {
        id: Uuid::new_v4(),
        name: "História".to_string(),
        class_id,
        teacher_id,
    };
    store.add_subject(math.clone()).await;
    store.add_subject(history.clone()).await;

    let mut students = Vec::new();
    for n in 0..student_count {
        let id = Uuid::new_v4();
        store
            .add_student(StudentProfile {
                id,
                name: format!("Aluno {n}"),
                email: format!("aluno{n}@escola.br"),
                enrollment: format!("2024{n:03}"),
                class: ClassInfo {
                    id: class_id,
                    name: "8B".to_string(),
                    grade: "8º ano".to_string(),
                },
            })
            .await;
        students.push(id);
    }

    School {
        store,
        class_id,
        teacher_id,
        math,
        history,
        students,
    }
}

async fn one_question_assessment(school: &School, subject: &Subject) -> Assessment {
    let assessment = Assessment {
        id: Uuid::new_v4(),
        title: format!("Prova de {}", subject.name),
        description: None,
        subject_id: subject.id,
        class_id: school.class_id,
        author_id: school.teacher_id,
        published_at: Utc::now(),
        due_at: None,
        max_score: 10.0,
        questions: vec![Question {
            id: Uuid::new_v4(),
            prompt: "2 + 2?".to_string(),
            variant: QuestionVariant::SingleSelect,
            options: vec!["3".to_string(), "4".to_string()],
            key: AnswerKey::Options(BTreeSet::from(["4".to_string()])),
        }],
    };
    school.store.create_assessment(&assessment).await.unwrap();
    assessment
}

fn answers(assessment: &Assessment, choice: &str) -> HashMap<Uuid, RawAnswer> {
    assessment
        .questions
        .iter()
        .map(|q| (q.id, RawAnswer::Selection(vec![choice.to_string()])))
        .collect()
}

fn services(
    school: &School,
    suggestions: Option<Arc<dyn SuggestionService>>,
) -> (SubmissionService, PerformanceService) {
    let store = school.store.clone();
    let ranking = Arc::new(LinearScanRanking::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    (
        SubmissionService::new(store.clone(), store.clone(), store.clone()),
        PerformanceService::new(store.clone(), store.clone(), store, ranking, suggestions),
    )
}

#[tokio::test]
async fn a_recorded_submission_is_visible_to_the_next_aggregation() {
    let school = school(1).await;
    let quiz = one_question_assessment(&school, &school.math).await;
    let (submissions, performance) = services(&school, None);
    let student = Identity::new(school.students[0], Role::Student);

    let before = performance.compute_performance(&student, None, false).await.unwrap();
    assert_eq!(before.metrics.completed, 0);

    submissions
        .submit(&student, quiz.id, &answers(&quiz, "4"))
        .await
        .unwrap();

    let after = performance.compute_performance(&student, None, false).await.unwrap();
    assert_eq!(after.metrics.completed, 1);
    assert_eq!(after.metrics.completion_rate, 100.0);
    assert_eq!(after.metrics.score_percentage, 100.0);
    assert_eq!(after.metrics.overall_score, 100);
    let math = after.progress.iter().find(|p| p.name == "Matemática").unwrap();
    assert_eq!(math.score, 100);
}

#[tokio::test]
async fn ranks_follow_the_overall_composite() {
    let school = school(3).await;
    let quiz = one_question_assessment(&school, &school.math).await;
    let (submissions, performance) = services(&school, None);

    let strong = Identity::new(school.students[0], Role::Student);
    let weak = Identity::new(school.students[1], Role::Student);
    submissions.submit(&strong, quiz.id, &answers(&quiz, "4")).await.unwrap();
    submissions.submit(&weak, quiz.id, &answers(&quiz, "3")).await.unwrap();

    let first = performance.compute_performance(&strong, None, false).await.unwrap();
    let second = performance.compute_performance(&weak, None, false).await.unwrap();
    let idle = Identity::new(school.students[2], Role::Student);
    let third = performance.compute_performance(&idle, None, false).await.unwrap();

    assert_eq!((first.rank.rank, first.rank.total_students), (1, 3));
    assert_eq!(second.rank.rank, 2);
    assert_eq!(third.rank.rank, 3);
}

#[tokio::test]
async fn guardians_and_teachers_are_scoped() {
    let school = school(2).await;
    let (_, performance) = services(&school, None);
    let guardian_id = Uuid::new_v4();
    school.store.link_guardian(guardian_id, school.students[1]).await;

    let guardian = Identity::new(guardian_id, Role::Guardian);
    let child = performance.compute_performance(&guardian, None, false).await.unwrap();
    assert_eq!(child.student.id, school.students[1]);

    let err = performance
        .compute_performance(&guardian, Some(school.students[0]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let orphan = Identity::new(Uuid::new_v4(), Role::Guardian);
    let err = performance.compute_performance(&orphan, None, false).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let teacher = Identity::new(school.teacher_id, Role::Teacher);
    let err = performance.compute_performance(&teacher, None, false).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    let seen = performance
        .compute_performance(&teacher, Some(school.students[0]), false)
        .await
        .unwrap();
    assert_eq!(seen.student.id, school.students[0]);

    let stranger = Identity::new(Uuid::new_v4(), Role::Teacher);
    let err = performance
        .compute_performance(&stranger, Some(school.students[0]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn suggestions_cover_only_weak_subjects() {
    let school = school(1).await;
    let math_quiz = one_question_assessment(&school, &school.math).await;
    let history_quiz = one_question_assessment(&school, &school.history).await;
    let generator = Arc::new(ScriptedSuggestions::default());
    let (submissions, performance) = services(&school, Some(generator.clone()));
    let student = Identity::new(school.students[0], Role::Student);

    submissions.submit(&student, math_quiz.id, &answers(&math_quiz, "4")).await.unwrap();
    submissions.submit(&student, history_quiz.id, &answers(&history_quiz, "3")).await.unwrap();

    let snapshot = performance.compute_performance(&student, None, true).await.unwrap();
    assert!(!snapshot.reinforcement_unavailable);
    let plan = snapshot.reinforcement.unwrap();
    assert_eq!(plan.suggestions.len(), 1);
    assert_eq!(plan.suggestions[0].subject, "História");

    let seen = generator.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].student_name, "Aluno 0");
    assert_eq!(seen[0].grade, "8º ano");
    assert_eq!(seen[0].subjects[0].score, 50);
    assert_eq!(seen[0].subjects[0].completion_rate, 100);
}

#[tokio::test]
async fn failing_generator_never_fails_the_snapshot() {
    let school = school(1).await;
    let quiz = one_question_assessment(&school, &school.history).await;
    let generator = Arc::new(ScriptedSuggestions {
        fail: true,
        ..Default::default()
    });
    let (submissions, performance) = services(&school, Some(generator.clone()));
    let student = Identity::new(school.students[0], Role::Student);
    submissions.submit(&student, quiz.id, &answers(&quiz, "3")).await.unwrap();

    let snapshot = performance.compute_performance(&student, None, true).await.unwrap();
    assert!(snapshot.reinforcement.is_none());
    assert!(snapshot.reinforcement_unavailable);
    assert_eq!(snapshot.metrics.completed, 1);

    // Not asked for: no call, nothing flagged.
    let quiet = performance.compute_performance(&student, None, false).await.unwrap();
    assert!(!quiet.reinforcement_unavailable);
    assert_eq!(generator.seen.lock().unwrap().len(), 1);
}
