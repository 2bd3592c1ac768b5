//! crates/classroom_core/src/scoring.rs
//!
//! Compares a typed answer set against the answer keys and produces a grade.
//! Pure and deterministic.

use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::domain::{AnswerKey, Question, SubmittedAnswer};
use crate::error::{EngineError, EngineResult};
use crate::question_bank::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub achieved_score: f64,
    pub correct_count: usize,
    pub total_count: usize,
    pub percentage: f64,
}

/// Whether `answer` matches the question's key.
///
/// Choice answers use order-independent set equality; free text is compared after
/// trimming and lowercasing. A variant mismatch is simply incorrect.
pub fn is_correct(question: &Question, answer: &SubmittedAnswer) -> bool {
    match (&question.key, answer) {
        (AnswerKey::Options(correct), SubmittedAnswer::SingleSelect(choice))
        | (AnswerKey::Options(correct), SubmittedAnswer::BooleanChoice(choice)) => {
            *correct == BTreeSet::from([choice.clone()])
        }
        (AnswerKey::Text(expected), SubmittedAnswer::FreeText(text)) => {
            normalize_text(text) == *expected
        }
        _ => false,
    }
}

/// Grades `answers` against `questions`.
///
/// Unanswered questions count as incorrect. An empty question list is a
/// configuration error and fails instead of dividing by zero.
pub fn score(
    questions: &[Question],
    answers: &HashMap<Uuid, SubmittedAnswer>,
    max_score: f64,
) -> EngineResult<ScoreOutcome> {
    let total_count = questions.len();
    if total_count == 0 {
        return Err(EngineError::validation(
            "an assessment must have at least one question",
        ));
    }

    let correct_count = questions
        .iter()
        .filter(|q| answers.get(&q.id).is_some_and(|a| is_correct(q, a)))
        .count();

    let ratio = correct_count as f64 / total_count as f64;
    Ok(ScoreOutcome {
        achieved_score: ratio * max_score,
        correct_count,
        total_count,
        percentage: ratio * 100.0,
    })
}
