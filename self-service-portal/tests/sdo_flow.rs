mod common;

use common::{with_storage, TestApp, ADMIN_PASSWORD, ADMIN_USERNAME, INVITATION_ID, SDO_TOKEN};
use secrecy::Secret;
use self_service_portal::config::CredentialStorage;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn mount_login(app: &TestApp) {
    Mock::given(method("POST"))
        .and(path("/admin/api/auth/login"))
        .and(body_json(json!({
            "email": "admin@example.com",
            "password": "sdo-password",
            "oa": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": SDO_TOKEN})))
        .mount(&app.sdo)
        .await;
}

async fn mount_search(app: &TestApp, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/admin/api/directories/explorer/members/search"))
        .and(query_param("path", "cm9vdA"))
        .and(query_param("pageSize", "10"))
        .and(query_param("search", "ja"))
        .and(header("authorization", format!("Bearer {}", SDO_TOKEN).as_str()))
        .respond_with(response)
        .mount(&app.sdo)
        .await;
}

async fn connected_app(storage: CredentialStorage) -> TestApp {
    let app = TestApp::spawn_with(with_storage(storage)).await;
    app.login().await;
    mount_login(&app).await;

    let response = app.connect_sdo().await;
    assert_eq!(response.status().as_u16(), 200);
    app
}

#[tokio::test]
async fn auth_reports_normalized_admin_url() {
    let app = TestApp::spawn().await;
    app.login().await;
    mount_login(&app).await;

    let body: Value = app.connect_sdo().await.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "authenticated");
    assert_eq!(body["base_url"], format!("{}/admin", app.sdo.uri()));
    assert_eq!(body["token_length"], SDO_TOKEN.len());

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["email"], "admin@example.com");
}

#[tokio::test]
async fn rejected_sdo_login_is_reported() {
    let app = TestApp::spawn().await;
    app.login().await;
    Mock::given(method("POST"))
        .and(path("/admin/api/auth/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&app.sdo)
        .await;

    let response = app.connect_sdo().await;
    assert_eq!(response.status().as_u16(), 502);

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], false);
}

#[tokio::test]
async fn search_returns_users_for_every_storage_strategy() {
    for storage in [
        CredentialStorage::Direct,
        CredentialStorage::TokenReference,
        CredentialStorage::FullReference,
    ] {
        let app = connected_app(storage).await;
        mount_search(
            &app,
            ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"id": "u1", "email": "jane@x.com"}]
            })),
        )
        .await;

        let response = app.get("/api/sdo/search?q=ja").await;
        assert_eq!(response.status().as_u16(), 200, "{:?}", storage);
        let users: Vec<Value> = response.json().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], "u1");
    }
}

#[tokio::test]
async fn short_search_term_is_rejected() {
    let app = connected_app(CredentialStorage::Direct).await;

    let response = app.get("/api/sdo/search?q=j").await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Search term must be at least 2 characters");
}

#[tokio::test]
async fn search_without_sdo_credential_is_unauthorized() {
    let app = TestApp::spawn().await;
    app.login().await;

    let response = app.get("/api/sdo/search?q=ja").await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Not authenticated with Secret Double Octopus. Please authenticate first."
    );
}

#[tokio::test]
async fn upstream_401_clears_the_credential() {
    let app = connected_app(CredentialStorage::TokenReference).await;
    mount_search(&app, ResponseTemplate::new(401)).await;

    let response = app.get("/api/sdo/search?q=ja").await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Authentication failed. Please re-authenticate.");

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], false);
}

#[tokio::test]
async fn invitation_id_is_extracted_and_rendered_as_qr() {
    let app = connected_app(CredentialStorage::Direct).await;
    Mock::given(method("POST"))
        .and(path("/admin/api/users/u1/invitations"))
        .and(body_json(json!({"invite": true, "invitationTypes": ["OCTOPUS"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "invitation": {"invitationId": INVITATION_ID, "status": "SENT"}
        })))
        .expect(1)
        .mount(&app.sdo)
        .await;

    let body: Value = app
        .post_json(
            "/api/sdo/invite",
            &json!({"userId": "u1", "invitationTypes": ["OCTOPUS"]}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["invitationId"], INVITATION_ID);
    assert_eq!(body["invitationDetails"]["status"], "SENT");

    let qr: Value = app
        .post_json("/api/sdo/qr", &json!({"invitationId": INVITATION_ID}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(
        qr["qr_data"],
        format!("https://127.0.0.1/enroll?invitation={}", INVITATION_ID)
    );
    assert_eq!(qr["test_mode"], false);
    assert!(qr["qr_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn single_type_invitation_body() {
    let app = connected_app(CredentialStorage::Direct).await;
    Mock::given(method("POST"))
        .and(path("/admin/api/users/u2/invitations"))
        .and(body_json(json!({"type": "FIDO"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": INVITATION_ID})))
        .expect(1)
        .mount(&app.sdo)
        .await;

    let body: Value = app
        .post_json("/api/sdo/invite", &json!({"userId": "u2", "type": "FIDO"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], INVITATION_ID);
}

#[tokio::test]
async fn malformed_invitation_id_is_rejected() {
    let app = TestApp::spawn().await;
    app.login().await;

    let response = app
        .post_json("/api/sdo/qr", &json!({"invitationId": "018short"}))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let check: Value = app
        .get("/api/sdo/validate?id=018short")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(check["valid"], false);
    assert_eq!(check["length"], 8);
}

#[tokio::test]
async fn invitation_details_fall_back_to_built_enrollment_url() {
    let app = connected_app(CredentialStorage::FullReference).await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/api/invitations/{}", INVITATION_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .mount(&app.sdo)
        .await;

    let body: Value = app
        .get(&format!("/api/sdo/invitations/{}", INVITATION_ID))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["invitation"]["status"], "PENDING");
    assert_eq!(
        body["enrollment_url"],
        format!("https://127.0.0.1/enroll?invitation={}", INVITATION_ID)
    );
}

#[tokio::test]
async fn portal_check_and_disconnect() {
    let app = connected_app(CredentialStorage::Direct).await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.sdo)
        .await;

    let check: Value = app.get("/api/sdo/portal/check").await.json().await.unwrap();
    assert_eq!(check["accessible"], true);
    assert_eq!(check["status_code"], 200);

    let logout: Value = app
        .post_json("/api/sdo/logout", &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(logout["status"], "unauthenticated");

    let response = app.get("/api/sdo/portal/check").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn portal_check_401_clears_the_credential() {
    let app = connected_app(CredentialStorage::FullReference).await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.sdo)
        .await;

    let check: Value = app.get("/api/sdo/portal/check").await.json().await.unwrap();
    assert_eq!(check["accessible"], false);
    assert_eq!(check["status_code"], 401);

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], false);

    let response = app.get("/api/sdo/portal/check").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_connection_does_not_store_credential() {
    let app = TestApp::spawn().await;
    app.login().await;
    mount_login(&app).await;

    let response = app
        .post_json(
            "/test-sdo-connection",
            &json!({
                "url": app.sdo.uri(),
                "email": "admin@example.com",
                "password": "sdo-password",
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], false);
}

#[tokio::test]
async fn portal_login_connects_configured_service_account() {
    let app = TestApp::spawn_with(|settings| {
        settings.sdo.email = Some("admin@example.com".to_string());
        settings.sdo.password = Some(Secret::new("sdo-password".to_string()));
    })
    .await;
    mount_login(&app).await;

    let body: Value = app
        .post_json(
            "/api/auth/login",
            &json!({"username": ADMIN_USERNAME, "password": ADMIN_PASSWORD}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["sdo_connected"], true);

    let status: Value = app.get("/api/sdo/status").await.json().await.unwrap();
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["base_url"], format!("{}/admin", app.sdo.uri()));
}
