//! Session capture and forwarding.
//!
//! Every non-health request names its session in a header. The first
//! request for a session runs the initializer through the registry's
//! single-flight gate. A request without a session id gets a 503 "not yet"
//! body; an initializer failure gets its error class with 401 or 500.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower::ServiceExt;
use tracing::{debug, warn};

use super::ServerState;
use crate::a2a::{ACTOR_HEADER, SESSION_HEADER, WORKLOAD_TOKEN_HEADER};
use crate::error::AppError;
use crate::subsystems::sessions::SessionKey;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Session identity from request headers. `None` without a session id.
pub(super) fn session_key(headers: &HeaderMap, default_actor: &str) -> Option<SessionKey> {
    Some(SessionKey {
        session_id: header(headers, SESSION_HEADER)?,
        actor_id: header(headers, ACTOR_HEADER).unwrap_or_else(|| default_actor.to_string()),
        identity_token: header(headers, WORKLOAD_TOKEN_HEADER),
    })
}

fn not_initialized() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "Agent not initialized",
            "message": "Waiting for session ID to initialize agent",
        })),
    )
        .into_response()
}

/// Status and body for a failed initialization. Only the class is exposed.
fn init_failed(err: &AppError) -> Response {
    let status = match err {
        AppError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let class = match err {
        AppError::Auth(_) | AppError::Config(_) => err.class(),
        _ => "internal_error",
    };
    (
        status,
        Json(json!({
            "error": class,
            "message": "session initialization failed",
        })),
    )
        .into_response()
}

/// Fallback handler: initialize the session if needed, then hand the
/// request unchanged to its sub-application.
pub(super) async fn forward(State(state): State<ServerState>, request: Request) -> Response {
    let Some(key) = session_key(request.headers(), &state.default_actor) else {
        debug!(path = %request.uri().path(), "request without session id");
        return not_initialized();
    };
    let fresh_token = key.identity_token.clone();

    let initializer = state.initializer.clone();
    let session = match state
        .registry
        .ensure_initialized(key, move |k| initializer.initialize(k))
        .await
    {
        Ok(s) => s,
        Err(e) => {
            warn!(class = e.class(), error = %e, "session initialization failed");
            return init_failed(&e);
        }
    };

    if let Some(token) = fresh_token {
        if session.refresh_identity_token(&token) {
            debug!(session_id = %session.session_id, "workload token refreshed");
            session.resources().tokens.refresh_workload_token(token);
        }
    }

    match session.resources().app.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn key_needs_session_header() {
        let mut headers = HeaderMap::new();
        assert!(session_key(&headers, "Actor1").is_none());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc"));
        let key = session_key(&headers, "Actor1").unwrap();
        assert_eq!(key.session_id, "abc");
        assert_eq!(key.actor_id, "Actor1");
        assert!(key.identity_token.is_none());

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("u1"));
        headers.insert(WORKLOAD_TOKEN_HEADER, HeaderValue::from_static("wl"));
        let key = session_key(&headers, "Actor1").unwrap();
        assert_eq!(key.actor_id, "u1");
        assert_eq!(key.identity_token.as_deref(), Some("wl"));
    }

    #[test]
    fn init_failures_keep_their_class() {
        let auth = init_failed(&AppError::Auth("refused".into()));
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);

        let config = init_failed(&AppError::Config("missing MEMORY_ID".into()));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let memory = init_failed(&AppError::Memory("timeout".into()));
        assert_eq!(memory.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn blank_session_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert!(session_key(&headers, "Actor1").is_none());
    }
}
