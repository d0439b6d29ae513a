use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::handlers::{
    app::{dashboard_handler, health_check, index},
    auth::{check_auth, login_handler, login_page, logout_handler, logout_page},
    metrics::metrics,
    sdo,
    verification::{
        check_pending_verifications, list_verifications, start_verification,
        test_au10tix_connection, verification_status, verification_url,
    },
};
use crate::middleware::auth::auth_middleware;
use crate::AppState;

fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard_handler))
        // SDO
        .route("/api/sdo/auth", post(sdo::sdo_auth))
        .route("/api/sdo/status", get(sdo::sdo_status))
        .route("/api/sdo/logout", post(sdo::sdo_logout))
        .route("/api/sdo/test-connection", post(sdo::test_connection))
        .route("/api/sdo/search", get(sdo::search_users))
        .route("/api/sdo/invite", post(sdo::send_invitation))
        .route("/api/sdo/invitations/:id", get(sdo::invitation_details))
        .route("/api/sdo/qr", post(sdo::generate_qr))
        .route("/api/sdo/validate", get(sdo::validate_invitation))
        .route("/api/sdo/portal/check", get(sdo::check_portal))
        .route("/test-sdo-connection", post(sdo::test_connection))
        // Verification
        .route("/api/verification", get(list_verifications))
        .route("/api/verification/start", post(start_verification))
        .route("/api/verification/check-pending", post(check_pending_verifications))
        .route("/api/verification/:id/status", get(verification_status))
        .route("/api/verification/:id/url", get(verification_url))
        .route("/start-verification", post(start_verification))
        .route("/check-verification/:id", get(verification_status))
        .route("/test-au10tix-connection", post(test_au10tix_connection))
        .route_layer(from_fn(auth_middleware))
}

pub fn build_router(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.settings.server.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/login", get(login_page))
        .route("/logout", get(logout_page))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/check", get(check_auth))
        .merge(protected_routes())
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
