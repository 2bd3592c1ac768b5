//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.
//! Field names follow the Portuguese wire contract the school front end already uses.

use std::collections::HashMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use classroom_core::{
    authoring::{AssessmentDraft, AssessmentListing},
    domain::{
        AnswerKey, AssessmentSummary, CompletionRecord, RawAnswer, ReinforcementPlan,
        StudentProfile,
    },
    performance::{round_percent, round_tenth, ImprovementArea, StudentPerformance, SubjectProgress},
    question_bank::{QuestionDraft, QuestionView},
    submission::SubmissionReceipt,
    EngineError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Answers
//=========================================================================================

/// An answer as it travels over the wire: a list of selected options for choice
/// questions, or a plain string for free-text questions.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(untagged)]
pub enum AnswerValue {
    Selection(Vec<String>),
    Text(String),
}

impl From<AnswerValue> for RawAnswer {
    fn from(value: AnswerValue) -> Self {
        match value {
            AnswerValue::Selection(items) => RawAnswer::Selection(items),
            AnswerValue::Text(text) => RawAnswer::Text(text),
        }
    }
}

impl From<AnswerKey> for AnswerValue {
    fn from(key: AnswerKey) -> Self {
        match key {
            AnswerKey::Options(set) => AnswerValue::Selection(set.into_iter().collect()),
            AnswerKey::Text(text) => AnswerValue::Text(text),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client
//=========================================================================================

/// Body of `POST /avaliacoes/{id}/submeter`, keyed by question id.
///
/// Values are taken as loosely as the browser sends them. Anything that is neither a
/// string nor a list of strings counts as no answer, and keys that are not question ids
/// are ignored, so one bad entry never rejects the whole attempt.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SubmitRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub respostas: HashMap<String, Value>,
}

impl SubmitRequest {
    pub fn into_answers(self) -> HashMap<Uuid, RawAnswer> {
        self.respostas
            .into_iter()
            .filter_map(|(key, value)| {
                let id = Uuid::parse_str(&key).ok()?;
                Some((id, answer_from_json(value)?))
            })
            .collect()
    }
}

fn answer_from_json(value: Value) -> Option<RawAnswer> {
    match value {
        Value::String(text) => Some(RawAnswer::Text(text)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(option) => Some(option),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(RawAnswer::Selection),
        _ => None,
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct QuestionPayload {
    pub enunciado: String,
    pub tipo: String,
    #[serde(default)]
    pub opcoes: Option<Vec<String>>,
    pub resposta_correta: AnswerValue,
}

/// Body of `POST /avaliacoes` and `PUT /avaliacoes/{id}`.
#[derive(Deserialize, Debug, ToSchema)]
pub struct AssessmentPayload {
    pub titulo: String,
    #[serde(default)]
    pub descricao: Option<String>,
    pub turma_id: Uuid,
    pub materia_id: Uuid,
    #[serde(default)]
    pub data_entrega: Option<DateTime<Utc>>,
    pub nota_maxima: f64,
    #[serde(default)]
    pub perguntas: Vec<QuestionPayload>,
}

impl From<AssessmentPayload> for AssessmentDraft {
    fn from(payload: AssessmentPayload) -> Self {
        AssessmentDraft {
            title: payload.titulo,
            description: payload.descricao,
            class_id: payload.turma_id,
            subject_id: payload.materia_id,
            due_at: payload.data_entrega,
            max_score: payload.nota_maxima,
            questions: payload
                .perguntas
                .into_iter()
                .map(|q| QuestionDraft {
                    prompt: q.enunciado,
                    variant: q.tipo,
                    options: q.opcoes,
                    correct: q.resposta_correta.into(),
                })
                .collect(),
        }
    }
}

/// Query string of `GET /desempenho`.
#[derive(Deserialize, Debug, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PerformanceQuery {
    /// Student to inspect. Required for teachers, optional for guardians.
    pub aluno_id: Option<Uuid>,
    /// Ask the suggestion generator for a reinforcement plan.
    #[serde(default)]
    pub sugestoes: bool,
}

//=========================================================================================
// Messages Sent FROM the Server
//=========================================================================================

/// The graded result of a submission.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct SubmitResponse {
    pub nota: f64,
    pub nota_maxima: f64,
    pub acertos: usize,
    pub total: usize,
    pub percentual: f64,
}

impl From<&SubmissionReceipt> for SubmitResponse {
    fn from(receipt: &SubmissionReceipt) -> Self {
        Self {
            nota: receipt.score,
            nota_maxima: receipt.max_score,
            acertos: receipt.correct_count,
            total: receipt.total_count,
            percentual: receipt.percentage,
        }
    }
}

/// A ledger entry as shown to the student who owns it.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct CompletionPayload {
    pub id: Uuid,
    pub conteudo_id: Uuid,
    pub tipo: String,
    pub data_conclusao: DateTime<Utc>,
    pub nota: Option<f64>,
    pub nota_maxima: Option<f64>,
    pub atraso: bool,
}

impl From<&CompletionRecord> for CompletionPayload {
    fn from(record: &CompletionRecord) -> Self {
        Self {
            id: record.id,
            conteudo_id: record.assessment_id,
            tipo: record.kind.as_tag().to_string(),
            data_conclusao: record.completed_at,
            nota: record.score,
            nota_maxima: record.max_score,
            atraso: record.late,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AssessmentListingPayload {
    pub id: Uuid,
    pub titulo: String,
    pub descricao: Option<String>,
    pub turma_id: Uuid,
    pub materia_id: Uuid,
    pub professor_id: Uuid,
    pub data_publicacao: DateTime<Utc>,
    pub data_entrega: Option<DateTime<Utc>>,
    pub nota_maxima: f64,
    /// The caller's own completion, for students only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atividade: Option<CompletionPayload>,
}

impl AssessmentListingPayload {
    fn new(summary: &AssessmentSummary, completion: Option<&CompletionRecord>) -> Self {
        Self {
            id: summary.id,
            titulo: summary.title.clone(),
            descricao: summary.description.clone(),
            turma_id: summary.class_id,
            materia_id: summary.subject_id,
            professor_id: summary.author_id,
            data_publicacao: summary.published_at,
            data_entrega: summary.due_at,
            nota_maxima: summary.max_score,
            atividade: completion.map(CompletionPayload::from),
        }
    }
}

impl From<&AssessmentListing> for AssessmentListingPayload {
    fn from(listing: &AssessmentListing) -> Self {
        Self::new(&listing.assessment, listing.completion.as_ref())
    }
}

/// Confirmation for create, update and delete.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct WriteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct QuestionViewPayload {
    pub id: Uuid,
    pub avaliacao_id: Uuid,
    pub enunciado: String,
    pub tipo: String,
    pub opcoes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resposta_correta: Option<AnswerValue>,
}

impl QuestionViewPayload {
    pub fn new(assessment_id: Uuid, view: QuestionView) -> Self {
        Self {
            id: view.id,
            avaliacao_id: assessment_id,
            enunciado: view.prompt,
            tipo: view.variant.as_tag().to_string(),
            opcoes: view.options,
            resposta_correta: view.key.map(AnswerValue::from),
        }
    }
}

//=========================================================================================
// Performance Snapshot
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ClassPayload {
    pub id: Uuid,
    pub nome: String,
    pub serie: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StudentPayload {
    pub id: Uuid,
    pub nome: String,
    pub email: String,
    pub matricula: String,
    pub turma: ClassPayload,
}

impl From<&StudentProfile> for StudentPayload {
    fn from(student: &StudentProfile) -> Self {
        Self {
            id: student.id,
            nome: student.name.clone(),
            email: student.email.clone(),
            matricula: student.enrollment.clone(),
            turma: ClassPayload {
                id: student.class.id,
                nome: student.class.name.clone(),
                serie: student.class.grade.clone(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub pontuacao_geral: i64,
    pub entregas_em_dia: usize,
    pub total_entregas: usize,
    pub avaliacoes_concluidas: usize,
    pub total_avaliacoes: usize,
    pub media_notas: f64,
    pub media_notas_maxima: f64,
    pub taxa_conclusao: i64,
    pub taxa_pontualidade: i64,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgressPayload {
    pub materia_id: Uuid,
    pub nome: String,
    pub pontuacao: i64,
    pub avaliacoes_concluidas: usize,
    pub total_avaliacoes: usize,
    pub nota_media: f64,
    pub nota_media_maxima: f64,
    pub taxa_conclusao: i64,
}

impl From<&SubjectProgress> for SubjectProgressPayload {
    fn from(p: &SubjectProgress) -> Self {
        Self {
            materia_id: p.subject_id,
            nome: p.name.clone(),
            pontuacao: p.score,
            avaliacoes_concluidas: p.completed,
            total_avaliacoes: p.assigned,
            nota_media: round_tenth(p.average_score),
            nota_media_maxima: round_tenth(p.average_max),
            taxa_conclusao: round_percent(p.completion_rate),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementAreaPayload {
    pub nome: String,
    pub pontuacao: i64,
    pub nota_media: f64,
    pub nota_media_maxima: f64,
    pub taxa_conclusao: i64,
}

impl From<&ImprovementArea> for ImprovementAreaPayload {
    fn from(area: &ImprovementArea) -> Self {
        Self {
            nome: area.name.clone(),
            pontuacao: area.score,
            nota_media: round_tenth(area.average_score),
            nota_media_maxima: round_tenth(area.average_max),
            taxa_conclusao: round_percent(area.completion_rate),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsPayload {
    pub ranking_turma: usize,
    pub total_alunos: usize,
    pub pontos_fortes: Vec<String>,
    pub areas_melhoria: Vec<ImprovementAreaPayload>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct SuggestionPayload {
    pub materia: String,
    pub diagnostico: String,
    pub acoes: Vec<String>,
    pub recursos: Vec<String>,
    pub meta: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReinforcementPayload {
    pub sugestoes: Vec<SuggestionPayload>,
    pub dicas_gerais: Vec<String>,
}

impl From<&ReinforcementPlan> for ReinforcementPayload {
    fn from(plan: &ReinforcementPlan) -> Self {
        Self {
            sugestoes: plan
                .suggestions
                .iter()
                .map(|s| SuggestionPayload {
                    materia: s.subject.clone(),
                    diagnostico: s.diagnosis.clone(),
                    acoes: s.actions.clone(),
                    recursos: s.resources.clone(),
                    meta: s.goal.clone(),
                })
                .collect(),
            dicas_gerais: plan.general_tips.clone(),
        }
    }
}

/// The response of `GET /desempenho`.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResponse {
    pub aluno: StudentPayload,
    pub metricas: MetricsPayload,
    pub progresso: Vec<SubjectProgressPayload>,
    pub estatisticas: StatisticsPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reforco: Option<ReinforcementPayload>,
    pub reforco_indisponivel: bool,
}

impl From<&StudentPerformance> for PerformanceResponse {
    fn from(snapshot: &StudentPerformance) -> Self {
        let m = &snapshot.metrics;
        Self {
            aluno: StudentPayload::from(&snapshot.student),
            metricas: MetricsPayload {
                pontuacao_geral: m.overall_score,
                entregas_em_dia: m.on_time,
                total_entregas: m.completed,
                avaliacoes_concluidas: m.completed,
                total_avaliacoes: m.assigned,
                media_notas: round_tenth(m.average_score),
                media_notas_maxima: round_tenth(m.average_max),
                taxa_conclusao: round_percent(m.completion_rate),
                taxa_pontualidade: round_percent(m.punctuality_rate),
            },
            progresso: snapshot.progress.iter().map(SubjectProgressPayload::from).collect(),
            estatisticas: StatisticsPayload {
                ranking_turma: snapshot.rank.rank,
                total_alunos: snapshot.rank.total_students,
                pontos_fortes: snapshot.strengths.clone(),
                areas_melhoria: snapshot
                    .improvement_areas
                    .iter()
                    .map(ImprovementAreaPayload::from)
                    .collect(),
            },
            reforco: snapshot.reinforcement.as_ref().map(ReinforcementPayload::from),
            reforco_indisponivel: snapshot.reinforcement_unavailable,
        }
    }
}

//=========================================================================================
// Errors
//=========================================================================================

/// The JSON body of every error response.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    /// On a duplicate submission, the attempt that was already recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atividade: Option<CompletionPayload>,
}

/// Wraps an `EngineError` so handlers can return it with `?`.
#[derive(Debug)]
pub struct ApiFailure(pub EngineError);

impl From<EngineError> for ApiFailure {
    fn from(err: EngineError) -> Self {
        ApiFailure(err)
    }
}

/// A body axum could not decode is reported like any other malformed input.
impl From<JsonRejection> for ApiFailure {
    fn from(rejection: JsonRejection) -> Self {
        ApiFailure(EngineError::Validation(rejection.body_text()))
    }
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict { .. } => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::EnrichmentUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let atividade = match &self.0 {
            EngineError::Conflict {
                existing: Some(record),
                ..
            } => Some(CompletionPayload::from(record.as_ref())),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
            atividade,
        };
        (status, Json(body)).into_response()
    }
}
