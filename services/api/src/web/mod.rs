pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use rest::{
    create_assessment_handler, delete_assessment_handler, list_assessments_handler,
    list_questions_handler, performance_handler, submit_assessment_handler,
    update_assessment_handler,
};
pub use state::AppState;

/// Builds the authenticated API router. CORS and the Swagger UI are layered on by
/// the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/avaliacoes",
            get(list_assessments_handler).post(create_assessment_handler),
        )
        .route(
            "/avaliacoes/{id}",
            put(update_assessment_handler).delete(delete_assessment_handler),
        )
        .route("/avaliacoes/{id}/perguntas", get(list_questions_handler))
        .route("/avaliacoes/{id}/submeter", post(submit_assessment_handler))
        .route("/desempenho", get(performance_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state)
}
