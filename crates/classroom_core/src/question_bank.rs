//! crates/classroom_core/src/question_bank.rs
//!
//! Question variants, answer-shape validation and the role-aware read projection.

use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::domain::{AnswerKey, Question, QuestionVariant, RawAnswer, Role, SubmittedAnswer};
use crate::error::{EngineError, EngineResult};

const BOOLEAN_OPTIONS: [&str; 2] = ["Verdadeiro", "Falso"];

/// A question as written by the assessment author, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub prompt: String,
    pub variant: String,
    pub options: Option<Vec<String>>,
    pub correct: RawAnswer,
}

/// Validates an authored question and turns it into its stored form.
///
/// Every configuration problem (unknown variant tag, answer key outside the option
/// set, empty free-text key) is reported here, so grading never sees one.
pub fn build_question(draft: QuestionDraft) -> EngineResult<Question> {
    let prompt = draft.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(EngineError::validation("question prompt must not be empty"));
    }

    let variant = QuestionVariant::from_tag(&draft.variant).ok_or_else(|| {
        EngineError::validation(format!("unknown question variant '{}'", draft.variant))
    })?;

    match variant {
        QuestionVariant::FreeText => {
            let key = match draft.correct {
                RawAnswer::Text(text) => normalize_text(&text),
                RawAnswer::Selection(_) => {
                    return Err(EngineError::validation(format!(
                        "question '{prompt}': a free-text answer key must be a single string"
                    )))
                }
            };
            if key.is_empty() {
                return Err(EngineError::validation(format!(
                    "question '{prompt}': the free-text answer key is empty"
                )));
            }
            Ok(Question {
                id: Uuid::new_v4(),
                prompt,
                variant,
                options: Vec::new(),
                key: AnswerKey::Text(key),
            })
        }
        QuestionVariant::SingleSelect | QuestionVariant::Boolean => {
            let options = match (variant, draft.options) {
                (QuestionVariant::Boolean, None) => {
                    BOOLEAN_OPTIONS.iter().map(|o| o.to_string()).collect()
                }
                (_, Some(options)) => options,
                (_, None) => Vec::new(),
            };
            if options.is_empty() || options.iter().any(|o| o.trim().is_empty()) {
                return Err(EngineError::validation(format!(
                    "question '{prompt}': options must be present and non-blank"
                )));
            }
            let distinct: BTreeSet<&String> = options.iter().collect();
            if distinct.len() != options.len() {
                return Err(EngineError::validation(format!(
                    "question '{prompt}': options must be unique"
                )));
            }

            let correct: BTreeSet<String> = match draft.correct {
                RawAnswer::Selection(items) => items.into_iter().collect(),
                RawAnswer::Text(item) => BTreeSet::from([item]),
            };
            if correct.is_empty() {
                return Err(EngineError::validation(format!(
                    "question '{prompt}': a correct option must be chosen"
                )));
            }
            if let Some(stray) = correct.iter().find(|c| !options.contains(c)) {
                return Err(EngineError::validation(format!(
                    "question '{prompt}': correct answer '{stray}' is not one of the options"
                )));
            }

            Ok(Question {
                id: Uuid::new_v4(),
                prompt,
                variant,
                options,
                key: AnswerKey::Options(correct),
            })
        }
    }
}

/// Checks whether `answer` has the shape the question's variant expects.
///
/// Choice variants accept exactly one element drawn from the option set. Any
/// string is a valid free-text answer.
pub fn validate_answer_shape(question: &Question, answer: &RawAnswer) -> bool {
    match (question.variant, answer) {
        (QuestionVariant::FreeText, RawAnswer::Text(_)) => true,
        (QuestionVariant::FreeText, RawAnswer::Selection(_)) => false,
        (_, RawAnswer::Selection(items)) => {
            items.len() == 1 && question.options.contains(&items[0])
        }
        (_, RawAnswer::Text(_)) => false,
    }
}

/// Converts a raw answer into its typed form, or `None` when the shape is invalid.
/// An invalid shape is graded as incorrect rather than rejected.
pub fn interpret(question: &Question, answer: &RawAnswer) -> Option<SubmittedAnswer> {
    if !validate_answer_shape(question, answer) {
        return None;
    }
    match (question.variant, answer) {
        (QuestionVariant::FreeText, RawAnswer::Text(text)) => {
            Some(SubmittedAnswer::FreeText(text.clone()))
        }
        (QuestionVariant::SingleSelect, RawAnswer::Selection(items)) => {
            items.first().cloned().map(SubmittedAnswer::SingleSelect)
        }
        (QuestionVariant::Boolean, RawAnswer::Selection(items)) => {
            items.first().cloned().map(SubmittedAnswer::BooleanChoice)
        }
        _ => None,
    }
}

/// Interprets a whole answer map against the authoritative question list.
/// Answers for unknown question ids and answers with an invalid shape are dropped.
pub fn interpret_all(
    questions: &[Question],
    raw: &HashMap<Uuid, RawAnswer>,
) -> HashMap<Uuid, SubmittedAnswer> {
    questions
        .iter()
        .filter_map(|q| {
            raw.get(&q.id)
                .and_then(|answer| interpret(q, answer))
                .map(|typed| (q.id, typed))
        })
        .collect()
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A question as shown to a caller. `key` is only present for teachers.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub variant: QuestionVariant,
    pub options: Vec<String>,
    pub key: Option<AnswerKey>,
}

/// Read projection of a question for `role`.
pub fn project(question: &Question, role: Role) -> QuestionView {
    let key = match role {
        Role::Teacher => Some(question.key.clone()),
        Role::Student | Role::Guardian => None,
    };
    QuestionView {
        id: question.id,
        prompt: question.prompt.clone(),
        variant: question.variant,
        options: question.options.clone(),
        key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice_draft(correct: &[&str]) -> QuestionDraft {
        QuestionDraft {
            prompt: "Capital of Brazil?".to_string(),
            variant: "multipla-escolha".to_string(),
            options: Some(vec!["Rio".into(), "Brasília".into(), "Salvador".into()]),
            correct: RawAnswer::Selection(correct.iter().map(|c| c.to_string()).collect()),
        }
    }

    #[test]
    fn builds_single_select_question() {
        let q = build_question(choice_draft(&["Brasília"])).unwrap();
        assert_eq!(q.variant, QuestionVariant::SingleSelect);
        assert_eq!(q.key, AnswerKey::Options(BTreeSet::from(["Brasília".to_string()])));
    }

    #[test]
    fn rejects_unknown_variant_tag() {
        let mut draft = choice_draft(&["Rio"]);
        draft.variant = "dissertativa".to_string();
        assert!(matches!(build_question(draft), Err(EngineError::Validation(_))));
    }

    #[test]
    fn rejects_key_outside_options() {
        let err = build_question(choice_draft(&["Recife"])).unwrap_err();
        assert!(err.to_string().contains("Recife"));
    }

    #[test]
    fn rejects_empty_key() {
        assert!(build_question(choice_draft(&[])).is_err());
    }

    #[test]
    fn boolean_defaults_its_options() {
        let q = build_question(QuestionDraft {
            prompt: "The sun is a star".to_string(),
            variant: "verdadeiro-falso".to_string(),
            options: None,
            correct: RawAnswer::Selection(vec!["Verdadeiro".into()]),
        })
        .unwrap();
        assert_eq!(q.options, vec!["Verdadeiro".to_string(), "Falso".to_string()]);
    }

    #[test]
    fn free_text_key_is_normalized() {
        let q = build_question(QuestionDraft {
            prompt: "Chemical symbol of water".to_string(),
            variant: "resposta-curta".to_string(),
            options: None,
            correct: RawAnswer::Text("  H2O ".into()),
        })
        .unwrap();
        assert_eq!(q.key, AnswerKey::Text("h2o".to_string()));
    }

    #[test]
    fn blank_free_text_key_is_rejected() {
        let draft = QuestionDraft {
            prompt: "Anything".to_string(),
            variant: "resposta-curta".to_string(),
            options: None,
            correct: RawAnswer::Text("   ".into()),
        };
        assert!(build_question(draft).is_err());
    }

    #[test]
    fn choice_shape_requires_exactly_one_known_option() {
        let q = build_question(choice_draft(&["Rio"])).unwrap();
        assert!(validate_answer_shape(&q, &RawAnswer::Selection(vec!["Rio".into()])));
        assert!(!validate_answer_shape(&q, &RawAnswer::Selection(vec![])));
        assert!(!validate_answer_shape(
            &q,
            &RawAnswer::Selection(vec!["Rio".into(), "Salvador".into()])
        ));
        assert!(!validate_answer_shape(&q, &RawAnswer::Selection(vec!["Lima".into()])));
        assert!(!validate_answer_shape(&q, &RawAnswer::Text("Rio".into())));
    }

    #[test]
    fn interpret_all_drops_malformed_and_unknown_answers() {
        let q = build_question(choice_draft(&["Rio"])).unwrap();
        let mut raw = HashMap::new();
        raw.insert(q.id, RawAnswer::Selection(vec!["Lima".into()]));
        raw.insert(Uuid::new_v4(), RawAnswer::Text("stray".into()));
        assert!(interpret_all(std::slice::from_ref(&q), &raw).is_empty());
    }

    #[test]
    fn projection_strips_key_for_students() {
        let q = build_question(choice_draft(&["Rio"])).unwrap();
        assert!(project(&q, Role::Student).key.is_none());
        assert!(project(&q, Role::Guardian).key.is_none());
        assert!(project(&q, Role::Teacher).key.is_some());
    }
}
