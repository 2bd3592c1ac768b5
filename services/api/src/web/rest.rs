//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    protocol::{
        AnswerValue, ApiFailure, AssessmentListingPayload, AssessmentPayload, ClassPayload,
        CompletionPayload, ErrorResponse, ImprovementAreaPayload, MetricsPayload,
        PerformanceQuery, PerformanceResponse, QuestionPayload, QuestionViewPayload,
        ReinforcementPayload, StatisticsPayload, StudentPayload, SubjectProgressPayload,
        SubmitRequest, SubmitResponse, SuggestionPayload, WriteResponse,
    },
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use classroom_core::domain::Identity;
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_assessments_handler,
        create_assessment_handler,
        update_assessment_handler,
        delete_assessment_handler,
        list_questions_handler,
        submit_assessment_handler,
        performance_handler,
    ),
    components(
        schemas(
            AnswerValue, SubmitRequest, SubmitResponse, QuestionPayload, AssessmentPayload,
            AssessmentListingPayload, CompletionPayload, WriteResponse, QuestionViewPayload,
            PerformanceResponse, StudentPayload, ClassPayload, MetricsPayload,
            SubjectProgressPayload, StatisticsPayload, ImprovementAreaPayload,
            ReinforcementPayload, SuggestionPayload, ErrorResponse
        )
    ),
    tags(
        (name = "Classroom API", description = "Assessments, submissions and student performance.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Assessment Handlers
//=========================================================================================

/// List the assessments visible to the caller, newest first.
///
/// Students get their class's assessments, each with their own completion when one
/// exists. Teachers get the assessments they authored.
#[utoipa::path(
    get,
    path = "/avaliacoes",
    responses(
        (status = 200, description = "Assessments visible to the caller", body = [AssessmentListingPayload]),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 403, description = "Guardians have no assessment catalog", body = ErrorResponse),
        (status = 503, description = "Storage unavailable, retry", body = ErrorResponse)
    )
)]
pub async fn list_assessments_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiFailure> {
    let listings = app_state.authoring.list(&identity).await?;
    let body: Vec<AssessmentListingPayload> =
        listings.iter().map(AssessmentListingPayload::from).collect();
    Ok(Json(body))
}

/// Create an assessment together with its questions.
#[utoipa::path(
    post,
    path = "/avaliacoes",
    request_body = AssessmentPayload,
    responses(
        (status = 201, description = "Assessment created", body = WriteResponse),
        (status = 400, description = "Malformed assessment definition", body = ErrorResponse),
        (status = 403, description = "Caller is not a teacher of the subject", body = ErrorResponse)
    )
)]
pub async fn create_assessment_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<AssessmentPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiFailure> {
    let Json(payload) = payload?;
    let assessment = app_state
        .authoring
        .create(&identity, payload.into())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            id: Some(assessment.id),
            message: "Avaliação criada com sucesso".to_string(),
        }),
    ))
}

/// Replace an assessment's metadata and whole question set.
#[utoipa::path(
    put,
    path = "/avaliacoes/{id}",
    request_body = AssessmentPayload,
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Assessment replaced", body = WriteResponse),
        (status = 400, description = "Malformed definition, or attempts already recorded", body = ErrorResponse),
        (status = 403, description = "Caller is not the author", body = ErrorResponse),
        (status = 404, description = "Unknown assessment", body = ErrorResponse)
    )
)]
pub async fn update_assessment_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    payload: Result<Json<AssessmentPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiFailure> {
    let Json(payload) = payload?;
    app_state
        .authoring
        .update(&identity, id, payload.into())
        .await?;
    Ok(Json(WriteResponse {
        id: Some(id),
        message: "Avaliação atualizada com sucesso".to_string(),
    }))
}

/// Delete an assessment, its questions and its completion records.
#[utoipa::path(
    delete,
    path = "/avaliacoes/{id}",
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Assessment deleted", body = WriteResponse),
        (status = 403, description = "Caller is not the author", body = ErrorResponse),
        (status = 404, description = "Unknown assessment", body = ErrorResponse)
    )
)]
pub async fn delete_assessment_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiFailure> {
    app_state.authoring.delete(&identity, id).await?;
    Ok(Json(WriteResponse {
        id: None,
        message: "Avaliação deletada com sucesso".to_string(),
    }))
}

/// Read an assessment's questions. Correct answers are only shown to teachers.
#[utoipa::path(
    get,
    path = "/avaliacoes/{id}/perguntas",
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Questions in authoring order", body = [QuestionViewPayload]),
        (status = 403, description = "Assessment belongs to another class", body = ErrorResponse),
        (status = 404, description = "Unknown assessment", body = ErrorResponse)
    )
)]
pub async fn list_questions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiFailure> {
    let views = app_state.authoring.questions(&identity, id).await?;
    let body: Vec<QuestionViewPayload> = views
        .into_iter()
        .map(|view| QuestionViewPayload::new(id, view))
        .collect();
    Ok(Json(body))
}

//=========================================================================================
// Submission Handler
//=========================================================================================

/// Submit answers for an assessment. Each student gets exactly one recorded attempt.
///
/// A duplicate submission answers 409 with the attempt already on record. A 503 means
/// nothing was recorded and the request may be retried.
#[utoipa::path(
    post,
    path = "/avaliacoes/{id}/submeter",
    request_body = SubmitRequest,
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Attempt graded and recorded", body = SubmitResponse),
        (status = 400, description = "Body is not a JSON object", body = ErrorResponse),
        (status = 403, description = "Caller is not a student of the assessment's class", body = ErrorResponse),
        (status = 404, description = "Unknown assessment", body = ErrorResponse),
        (status = 409, description = "Already submitted", body = ErrorResponse),
        (status = 503, description = "Storage unavailable, retry", body = ErrorResponse)
    )
)]
pub async fn submit_assessment_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    request: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiFailure> {
    let Json(request) = request?;
    let answers = request.into_answers();
    let receipt = app_state
        .submissions
        .submit(&identity, id, &answers)
        .await?;
    Ok(Json(SubmitResponse::from(&receipt)))
}

//=========================================================================================
// Performance Handler
//=========================================================================================

/// Performance snapshot of a student: metrics, per-subject progress and class rank.
#[utoipa::path(
    get,
    path = "/desempenho",
    params(PerformanceQuery),
    responses(
        (status = 200, description = "Performance snapshot", body = PerformanceResponse),
        (status = 400, description = "Teachers must name a student", body = ErrorResponse),
        (status = 403, description = "Student is outside the caller's scope", body = ErrorResponse),
        (status = 404, description = "Unknown student, or no linked student", body = ErrorResponse)
    )
)]
pub async fn performance_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PerformanceQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let snapshot = app_state
        .performance
        .compute_performance(&identity, query.aluno_id, query.sugestoes)
        .await?;
    Ok(Json(PerformanceResponse::from(&snapshot)))
}
