use crate::models::operator::OPERATOR_SESSION_KEY;
use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use service_core::error::AppError;
use tower_sessions::Session;

/// Gate for operator-only routes.
///
/// JSON routes answer 401; pages redirect to the login form.
pub async fn auth_middleware(session: Session, request: Request<Body>, next: Next) -> Response {
    let operator: Option<String> = session.get(OPERATOR_SESSION_KEY).await.unwrap_or(None);

    if operator.is_some_and(|name| !name.is_empty()) {
        return next.run(request).await;
    }

    if request.uri().path().starts_with("/api/") {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated API call");
        return AppError::Unauthorized(anyhow::anyhow!("Portal login required")).into_response();
    }

    Redirect::to("/login").into_response()
}
