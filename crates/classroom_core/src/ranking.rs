//! crates/classroom_core/src/ranking.rs
//!
//! Situates one student within the overall composite scores of their class.
//!
//! The linear-scan strategy re-aggregates every class member on each call, i.e.
//! O(students in class) ledger reads. It is a recomputation, not a materialized
//! leaderboard; callers that need frequent reads should cache at their boundary or
//! plug in a different [`RankingStrategy`].

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::ActivityKind;
use crate::error::EngineResult;
use crate::performance::overall_metrics;
use crate::ports::{CatalogStore, LedgerStore, RosterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRank {
    pub rank: usize,
    pub total_students: usize,
}

/// `1 + count(scores strictly greater than target)`. Tied students share the best
/// rank among them.
pub fn rank_of(scores: &[i64], target: i64) -> usize {
    1 + scores.iter().filter(|&&s| s > target).count()
}

#[async_trait]
pub trait RankingStrategy: Send + Sync {
    async fn rank_within_class(
        &self,
        class_id: Uuid,
        target_student_id: Uuid,
    ) -> EngineResult<ClassRank>;
}

/// Computes every class member's overall composite on demand.
#[derive(Clone)]
pub struct LinearScanRanking {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    roster: Arc<dyn RosterStore>,
}

impl LinearScanRanking {
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
}

#[async_trait]
impl RankingStrategy for LinearScanRanking {
    async fn rank_within_class(
        &self,
        class_id: Uuid,
        target_student_id: Uuid,
    ) -> EngineResult<ClassRank> {
        let assigned = self.catalog.list_assessments_for_class(class_id).await?;
        let students = self.roster.list_student_ids_in_class(class_id).await?;

        let mut scores = Vec::with_capacity(students.len());
        let mut target_score = None;
        for student_id in &students {
            let records = self
                .ledger
                .list_for_student(*student_id, ActivityKind::Assessment)
                .await?;
            let score = overall_metrics(&assigned, &records).overall_score;
            if *student_id == target_student_id {
                target_score = Some(score);
            }
            scores.push(score);
        }

        let target_score = match target_score {
            Some(score) => score,
            None => {
                let records = self
                    .ledger
                    .list_for_student(target_student_id, ActivityKind::Assessment)
                    .await?;
                overall_metrics(&assigned, &records).overall_score
            }
        };

        scores.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ClassRank {
            rank: rank_of(&scores, target_score),
            total_students: students.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AnswerKey, Assessment, AssessmentSummary, ClassInfo, CompletionRecord, Question,
        QuestionVariant, StudentProfile,
    };
    use crate::memory::InMemoryStore;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;

    #[test]
    fn ties_share_the_best_rank() {
        let scores = [90, 80, 80, 70, 60];
        assert_eq!(rank_of(&scores, 90), 1);
        assert_eq!(rank_of(&scores, 80), 2);
        assert_eq!(rank_of(&scores, 70), 4);
        assert_eq!(rank_of(&scores, 60), 5);
    }

    #[test]
    fn everyone_tied_is_first() {
        assert_eq!(rank_of(&[50, 50, 50], 50), 1);
    }

    async fn seed_class(store: &InMemoryStore, grades: &[f64]) -> (Uuid, Vec<Uuid>) {
        let class_id = Uuid::new_v4();
        let assessment = Assessment {
            id: Uuid::new_v4(),
            title: "quiz".to_string(),
            description: None,
            subject_id: Uuid::new_v4(),
            class_id,
            author_id: Uuid::new_v4(),
            published_at: Utc::now(),
            due_at: None,
            max_score: 10.0,
            questions: vec![Question {
                id: Uuid::new_v4(),
                prompt: "q".to_string(),
                variant: QuestionVariant::SingleSelect,
                options: vec!["a".into()],
                key: AnswerKey::Options(BTreeSet::from(["a".to_string()])),
            }],
        };
        store.create_assessment(&assessment).await.unwrap();
        let summary: AssessmentSummary = assessment.summary();

        let mut ids = Vec::new();
        for (n, grade) in grades.iter().enumerate() {
            let id = Uuid::new_v4();
            store
                .add_student(StudentProfile {
                    id,
                    name: format!("student {n}"),
                    email: format!("s{n}@escola.br"),
                    enrollment: format!("{n:04}"),
                    class: ClassInfo {
                        id: class_id,
                        name: "9C".to_string(),
                        grade: "9º ano".to_string(),
                    },
                })
                .await;
            store
                .seed_completion(CompletionRecord {
                    id: Uuid::new_v4(),
                    student_id: id,
                    assessment_id: summary.id,
                    kind: ActivityKind::Assessment,
                    completed_at: Utc::now(),
                    score: Some(*grade),
                    max_score: Some(10.0),
                    late: false,
                })
                .await;
            ids.push(id);
        }
        (class_id, ids)
    }

    #[tokio::test]
    async fn linear_scan_ranks_against_classmates() {
        let store = Arc::new(InMemoryStore::new());
        // composites: 40 + 0.4 * grade% + 20
        let (class_id, ids) = seed_class(&store, &[10.0, 5.0, 5.0, 0.0]).await;
        let ranking = LinearScanRanking::new(store.clone(), store.clone(), store.clone());

        let best = ranking.rank_within_class(class_id, ids[0]).await.unwrap();
        let tied_a = ranking.rank_within_class(class_id, ids[1]).await.unwrap();
        let tied_b = ranking.rank_within_class(class_id, ids[2]).await.unwrap();
        let last = ranking.rank_within_class(class_id, ids[3]).await.unwrap();

        assert_eq!(best, ClassRank { rank: 1, total_students: 4 });
        assert_eq!(tied_a.rank, 2);
        assert_eq!(tied_b.rank, 2);
        assert_eq!(last.rank, 4);
    }

    #[tokio::test]
    async fn linear_scan_reads_each_classmate_once() {
        let store = Arc::new(InMemoryStore::new());
        let (class_id, ids) = seed_class(&store, &[10.0, 5.0, 5.0, 0.0]).await;
        let ranking = LinearScanRanking::new(store.clone(), store.clone(), store.clone());

        let before = store.ledger_reads.load(Ordering::Relaxed);
        ranking.rank_within_class(class_id, ids[1]).await.unwrap();
        assert_eq!(store.ledger_reads.load(Ordering::Relaxed) - before, 4);

        // A target outside the roster costs one extra read.
        let before = store.ledger_reads.load(Ordering::Relaxed);
        let outsider = ranking.rank_within_class(class_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(store.ledger_reads.load(Ordering::Relaxed) - before, 5);
        assert_eq!(outsider.total_students, 4);
    }
}
