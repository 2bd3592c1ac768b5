//! crates/classroom_core/src/performance.rs
//!
//! Derives a student's performance snapshot from the completion ledger and the
//! class catalog. Nothing here is persisted; every request recomputes from the
//! latest records.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    ActivityKind, AssessmentSummary, CompletionRecord, Identity, ReinforcementPlan, Role,
    StudentProfile, Subject, SubjectShortfall, SuggestionRequest,
};
use crate::error::{EngineError, EngineResult};
use crate::ports::{CatalogStore, LedgerStore, RosterStore, SuggestionService};
use crate::ranking::{ClassRank, RankingStrategy};

/// Subject composites at or above this are strengths.
pub const STRENGTH_THRESHOLD: i64 = 80;
/// Subject composites below this are improvement areas.
pub const IMPROVEMENT_THRESHOLD: i64 = 70;
const MAX_STRENGTHS: usize = 3;
/// Shown as the average maximum score when nothing has been graded yet.
const DISPLAY_DEFAULT_MAX: f64 = 10.0;

//=========================================================================================
// Snapshot Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectProgress {
    pub subject_id: Uuid,
    pub name: String,
    /// Rounded composite, 0-100.
    pub score: i64,
    pub completed: usize,
    pub assigned: usize,
    pub average_score: f64,
    pub average_max: f64,
    pub completion_rate: f64,
    pub score_percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    /// Rounded overall composite, 0-100.
    pub overall_score: i64,
    pub completion_rate: f64,
    pub score_percentage: f64,
    pub punctuality_rate: f64,
    pub on_time: usize,
    pub completed: usize,
    pub assigned: usize,
    pub average_score: f64,
    pub average_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImprovementArea {
    pub name: String,
    pub score: i64,
    pub average_score: f64,
    pub average_max: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentPerformance {
    pub student: StudentProfile,
    pub metrics: PerformanceMetrics,
    pub progress: Vec<SubjectProgress>,
    pub rank: ClassRank,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<ImprovementArea>,
    pub reinforcement: Option<ReinforcementPlan>,
    /// Set when suggestions were requested but could not be produced.
    pub reinforcement_unavailable: bool,
}

//=========================================================================================
// Pure Aggregation
//=========================================================================================

/// `numerator / denominator * 100`, or 0 when the denominator is 0. Always in [0, 100].
pub fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
}

/// Nearest-integer rounding used for every display-facing percentage.
pub fn round_percent(value: f64) -> i64 {
    value.round() as i64
}

/// One-decimal rounding used for displayed point averages.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn subject_composite(completion_rate: f64, score_percentage: f64) -> f64 {
    0.5 * completion_rate + 0.5 * score_percentage
}

pub fn overall_composite(completion_rate: f64, score_percentage: f64, punctuality_rate: f64) -> f64 {
    0.4 * completion_rate + 0.4 * score_percentage + 0.2 * punctuality_rate
}

/// Mean achieved score and mean max score over the graded records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeAverages {
    pub graded: usize,
    pub mean_score: f64,
    pub mean_max: f64,
}

impl GradeAverages {
    pub fn over<'a>(records: impl IntoIterator<Item = &'a CompletionRecord>) -> Self {
        let (graded, sum_score, sum_max) = records
            .into_iter()
            .filter_map(CompletionRecord::graded)
            .fold((0usize, 0.0, 0.0), |(n, s, m), (score, max)| (n + 1, s + score, m + max));
        if graded == 0 {
            return Self {
                graded,
                mean_score: 0.0,
                mean_max: 0.0,
            };
        }
        Self {
            graded,
            mean_score: sum_score / graded as f64,
            mean_max: sum_max / graded as f64,
        }
    }

    /// `mean(score) / mean(max) * 100`, or 0 without graded completions.
    pub fn percentage(&self) -> f64 {
        if self.graded == 0 || self.mean_max <= 0.0 {
            return 0.0;
        }
        (self.mean_score / self.mean_max * 100.0).clamp(0.0, 100.0)
    }

    fn display_max(&self) -> f64 {
        if self.graded == 0 {
            DISPLAY_DEFAULT_MAX
        } else {
            self.mean_max
        }
    }
}

/// Keeps only completions that belong to the assigned catalog, so that rates never
/// exceed 100 when stale records of removed assessments linger.
pub fn assigned_completions<'a>(
    assigned: &[AssessmentSummary],
    completions: &'a [CompletionRecord],
) -> Vec<&'a CompletionRecord> {
    let ids: HashSet<Uuid> = assigned.iter().map(|a| a.id).collect();
    completions
        .iter()
        .filter(|r| r.kind == ActivityKind::Assessment && ids.contains(&r.assessment_id))
        .collect()
}

/// Overall metrics for one student from the class catalog and the student's records.
pub fn overall_metrics(
    assigned: &[AssessmentSummary],
    completions: &[CompletionRecord],
) -> PerformanceMetrics {
    let relevant = assigned_completions(assigned, completions);
    let completed = relevant.len();
    let on_time = relevant.iter().filter(|r| !r.late).count();
    let grades = GradeAverages::over(relevant.iter().copied());

    let completion_rate = rate(completed, assigned.len());
    let score_percentage = grades.percentage();
    let punctuality_rate = rate(on_time, completed);
    let composite = overall_composite(completion_rate, score_percentage, punctuality_rate);

    PerformanceMetrics {
        overall_score: round_percent(composite),
        completion_rate,
        score_percentage,
        punctuality_rate,
        on_time,
        completed,
        assigned: assigned.len(),
        average_score: grades.mean_score,
        average_max: grades.display_max(),
    }
}

/// Per-subject progress, in the order the subjects are given.
pub fn subject_progress(
    subjects: &[Subject],
    assigned: &[AssessmentSummary],
    completions: &[CompletionRecord],
) -> Vec<SubjectProgress> {
    subjects
        .iter()
        .map(|subject| {
            let in_subject: Vec<AssessmentSummary> = assigned
                .iter()
                .filter(|a| a.subject_id == subject.id)
                .cloned()
                .collect();
            let done = assigned_completions(&in_subject, completions);
            let grades = GradeAverages::over(done.iter().copied());

            let completion_rate = rate(done.len(), in_subject.len());
            let score_percentage = grades.percentage();
            let composite = subject_composite(completion_rate, score_percentage);

            SubjectProgress {
                subject_id: subject.id,
                name: subject.name.clone(),
                score: round_percent(composite),
                completed: done.len(),
                assigned: in_subject.len(),
                average_score: grades.mean_score,
                average_max: grades.display_max(),
                completion_rate,
                score_percentage,
            }
        })
        .collect()
}

/// Up to three subject names scoring at least 80, best first.
pub fn strengths(progress: &[SubjectProgress]) -> Vec<String> {
    let mut strong: Vec<&SubjectProgress> = progress
        .iter()
        .filter(|p| p.score >= STRENGTH_THRESHOLD)
        .collect();
    strong.sort_by(|a, b| b.score.cmp(&a.score));
    strong
        .into_iter()
        .take(MAX_STRENGTHS)
        .map(|p| p.name.clone())
        .collect()
}

/// Every subject scoring below 70, worst first.
pub fn improvement_areas(progress: &[SubjectProgress]) -> Vec<ImprovementArea> {
    let mut weak: Vec<&SubjectProgress> = progress
        .iter()
        .filter(|p| p.score < IMPROVEMENT_THRESHOLD)
        .collect();
    weak.sort_by(|a, b| a.score.cmp(&b.score));
    weak.into_iter()
        .map(|p| ImprovementArea {
            name: p.name.clone(),
            score: p.score,
            average_score: p.average_score,
            average_max: p.average_max,
            completion_rate: p.completion_rate,
        })
        .collect()
}

//=========================================================================================
// Service
//=========================================================================================

#[derive(Clone)]
pub struct PerformanceService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    roster: Arc<dyn RosterStore>,
    ranking: Arc<dyn RankingStrategy>,
    suggestions: Option<Arc<dyn SuggestionService>>,
}

impl PerformanceService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LedgerStore>,
        roster: Arc<dyn RosterStore>,
        ranking: Arc<dyn RankingStrategy>,
        suggestions: Option<Arc<dyn SuggestionService>>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            roster,
            ranking,
            suggestions,
        }
    }

    /// Decides whose performance the caller may see.
    ///
    /// Students always see themselves. Guardians see a linked child, the first one
    /// when none is named. Teachers must name a student of a class they teach.
    pub async fn resolve_target(
        &self,
        identity: &Identity,
        requested: Option<Uuid>,
    ) -> EngineResult<Uuid> {
        match identity.role {
            Role::Student => Ok(identity.user_id),
            Role::Guardian => {
                let children = self.roster.list_children(identity.user_id).await?;
                match requested {
                    None => children.first().copied().ok_or_else(|| {
                        EngineError::NotFound("no student linked to this guardian".to_string())
                    }),
                    Some(id) if children.contains(&id) => Ok(id),
                    Some(_) => Err(EngineError::unauthorized(
                        "student is not linked to this guardian",
                    )),
                }
            }
            Role::Teacher => {
                let student_id = requested.ok_or_else(|| {
                    EngineError::validation("teachers must name the student to inspect")
                })?;
                let student = self.roster.get_student(student_id).await?;
                if !self
                    .roster
                    .teaches_class(identity.user_id, student.class.id)
                    .await?
                {
                    return Err(EngineError::unauthorized(
                        "teacher does not teach the student's class",
                    ));
                }
                Ok(student_id)
            }
        }
    }

    /// Computes the full snapshot for the student the caller is allowed to see.
    pub async fn compute_performance(
        &self,
        identity: &Identity,
        requested: Option<Uuid>,
        with_suggestions: bool,
    ) -> EngineResult<StudentPerformance> {
        let student_id = self.resolve_target(identity, requested).await?;
        let student = self.roster.get_student(student_id).await?;
        let class_id = student.class.id;

        let assigned = self.catalog.list_assessments_for_class(class_id).await?;
        let completions = self
            .ledger
            .list_for_student(student_id, ActivityKind::Assessment)
            .await?;
        let subjects = self.roster.list_subjects_for_class(class_id).await?;

        let metrics = overall_metrics(&assigned, &completions);
        let progress = subject_progress(&subjects, &assigned, &completions);
        let rank = self.ranking.rank_within_class(class_id, student_id).await?;
        let strengths = strengths(&progress);
        let improvement_areas = improvement_areas(&progress);

        debug!(
            %student_id,
            overall = metrics.overall_score,
            rank = rank.rank,
            "Performance computed"
        );

        let mut snapshot = StudentPerformance {
            student,
            metrics,
            progress,
            rank,
            strengths,
            improvement_areas,
            reinforcement: None,
            reinforcement_unavailable: false,
        };

        if with_suggestions && !snapshot.improvement_areas.is_empty() {
            match self.enrich(&snapshot).await {
                Ok(plan) => snapshot.reinforcement = Some(plan),
                Err(e) => {
                    warn!(%student_id, error = %e, "Returning performance without suggestions");
                    snapshot.reinforcement_unavailable = true;
                }
            }
        }

        Ok(snapshot)
    }

    async fn enrich(&self, snapshot: &StudentPerformance) -> EngineResult<ReinforcementPlan> {
        let service = self.suggestions.as_ref().ok_or_else(|| {
            EngineError::EnrichmentUnavailable("no suggestion generator configured".to_string())
        })?;

        let request = SuggestionRequest {
            student_name: snapshot.student.name.clone(),
            grade: snapshot.student.class.grade.clone(),
            subjects: snapshot
                .progress
                .iter()
                .filter(|p| p.score < IMPROVEMENT_THRESHOLD)
                .map(|p| SubjectShortfall {
                    subject_name: p.name.clone(),
                    score: p.score,
                    average_score: round_tenth(p.score_percentage),
                    completion_rate: round_percent(p.completion_rate),
                })
                .collect(),
        };

        service
            .suggest(&request)
            .await
            .map_err(|e| EngineError::EnrichmentUnavailable(e.to_string()))
    }
}
