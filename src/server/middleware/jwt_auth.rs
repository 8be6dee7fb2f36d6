//! Bearer-token middleware (§6.1 "Authentication"). Resolves the caller's
//! external subject via `domains::auth::JwtVerifier` and attaches it to the
//! request extensions; unlike the teacher's permissive "continue without
//! `AuthUser`" pattern, every route this core serves (besides `/health`) is
//! private, so a resolution failure short-circuits with 401.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::common::error::OrchestratorError;
use crate::server::app::AppState;

/// The caller's external subject (bearer token `sub` claim, or the
/// deterministic dev-bypass subject), attached to request extensions by
/// `require_auth` for handlers to read.
#[derive(Debug, Clone)]
pub struct ExternalSubject(pub String);

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.jwt_verifier.resolve_subject(header).await {
        Ok(subject) => {
            request.extensions_mut().insert(ExternalSubject(subject));
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "auth failed");
            OrchestratorError::Unauthorized.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::auth::JwtVerifier;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn test_state(auth_disabled: bool) -> AppState {
        AppState::for_tests(Arc::new(JwtVerifier::new(None, None, None, auth_disabled)))
    }

    #[tokio::test]
    async fn dev_bypass_lets_request_through() {
        let state = test_state(true);
        let app = Router::new()
            .route("/p", get(ok_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);

        let response = app
            .oneshot(HttpRequest::builder().uri("/p").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_without_bypass_is_rejected() {
        let state = test_state(false);
        let app = Router::new()
            .route("/p", get(ok_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);

        let response = app
            .oneshot(HttpRequest::builder().uri("/p").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
