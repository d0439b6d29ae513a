mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{test_settings, TestApp, ADMIN_PASSWORD, ADMIN_USERNAME};
use self_service_portal::startup::build_router;
use self_service_portal::AppState;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::MockServer;

async fn router() -> axum::Router {
    let sdo = MockServer::start().await;
    let au10tix = MockServer::start().await;
    build_router(AppState::from_settings(test_settings(&sdo, &au10tix)).unwrap())
}

#[tokio::test]
async fn health_check_works() {
    let response = router()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"status": "ok", "service": "self-service-portal"}));
}

#[tokio::test]
async fn protected_api_requires_login() {
    let response = router()
        .await
        .oneshot(
            Request::builder()
                .uri("/api/sdo/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()["content-security-policy"],
        "default-src 'none'; frame-ancestors 'none'"
    );
}

#[tokio::test]
async fn dashboard_redirects_to_login() {
    let response = router()
        .await
        .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/login");
}

#[tokio::test]
async fn login_page_renders() {
    let response = router()
        .await
        .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("login-form"));
}

#[tokio::test]
async fn wrong_portal_password_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({"username": ADMIN_USERNAME, "password": "wrong"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 401);

    let check: Value = app.get("/api/auth/check").await.json().await.unwrap();
    assert_eq!(check["authenticated"], false);
}

#[tokio::test]
async fn login_then_dashboard_then_logout() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({"username": ADMIN_USERNAME, "password": ADMIN_PASSWORD}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["sdo_connected"], false);

    let check: Value = app.get("/api/auth/check").await.json().await.unwrap();
    assert_eq!(check["username"], ADMIN_USERNAME);

    let dashboard = app.get("/dashboard").await;
    assert_eq!(dashboard.status().as_u16(), 200);
    assert!(dashboard.text().await.unwrap().contains("Identity verification"));

    let logout = app.post_json("/api/auth/logout", &json!({})).await;
    assert_eq!(logout.status().as_u16(), 200);

    let dashboard = app.get("/dashboard").await;
    assert!(dashboard.status().is_redirection());
}
