//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use classroom_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::{protocol::ErrorResponse, state::AppState};

/// Middleware that resolves the session cookie into an `Identity`.
///
/// If valid, inserts the identity into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    // 1. Extract the session token from the cookie header
    let token = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token)
        .ok_or_else(unauthenticated)?
        .to_string();

    // 2. Resolve it against the session store
    let identity = state.sessions.resolve_session(&token).await.map_err(|e| match e {
        PortError::Unauthorized | PortError::NotFound(_) => {
            debug!("Rejected unknown or expired session");
            unauthenticated()
        }
        other => {
            error!("Failed to validate auth session: {:?}", other);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "session store unavailable".to_string(),
                    retryable: true,
                    atividade: None,
                }),
            )
                .into_response()
        }
    })?;

    // 3. Hand the identity to the handler
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Finds the `session=` pair in a `Cookie` header value.
fn session_token(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|token| !token.is_empty())
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Não autenticado".to_string(),
            retryable: false,
            atividade: None,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::session_token;

    #[test]
    fn finds_session_among_other_cookies() {
        assert_eq!(session_token("theme=dark; session=abc123; lang=pt"), Some("abc123"));
        assert_eq!(session_token("session=xyz"), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_session_is_none() {
        assert_eq!(session_token("theme=dark"), None);
        assert_eq!(session_token("session="), None);
    }
}
