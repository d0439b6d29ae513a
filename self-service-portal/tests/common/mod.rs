#![allow(dead_code)]

use secrecy::Secret;
use self_service_portal::config::{
    Au10tixSettings, CredentialStorage, ObservabilitySettings, PortalSettings, SdoSettings,
    ServerSettings, Settings, VerificationSettings,
};
use self_service_portal::startup::build_router;
use self_service_portal::utils::jwt::encode_unsigned;
use self_service_portal::AppState;
use serde_json::{json, Value};
use wiremock::MockServer;

pub const ADMIN_USERNAME: &str = "operator";
pub const ADMIN_PASSWORD: &str = "correct-horse";
pub const SDO_TOKEN: &str = "sdo-token-123";
pub const INVITATION_ID: &str = "018abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMN";

/// Settings pointing every outbound call at the given mock servers.
pub fn test_settings(sdo: &MockServer, au10tix: &MockServer) -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            secure_cookies: false,
            shutdown_grace_secs: 1,
        },
        observability: ObservabilitySettings::default(),
        portal: PortalSettings {
            admin_username: ADMIN_USERNAME.to_string(),
            admin_password: Secret::new(ADMIN_PASSWORD.to_string()),
        },
        sdo: SdoSettings {
            default_url: sdo.uri(),
            timeout_secs: 5,
            ..SdoSettings::default()
        },
        au10tix: Au10tixSettings {
            token: Some(Secret::new(au10tix_token(&au10tix.uri()))),
            base_url: au10tix.uri(),
            timeout_secs: 5,
            ..Au10tixSettings::default()
        },
        verification: VerificationSettings::default(),
    }
}

/// An unexpired JWT-shaped token routing to `api_url`.
pub fn au10tix_token(api_url: &str) -> String {
    encode_unsigned(&json!({
        "exp": 4102444800i64,
        "apiUrl": api_url,
        "clientOrganizationName": "Test Org",
        "clientOrganizationId": 7,
        "sub": "svc-portal",
        "bosUrl": "https://bos.example.com",
    }))
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub sdo: MockServer,
    pub au10tix: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with<F>(customize: F) -> Self
    where
        F: FnOnce(&mut Settings),
    {
        let sdo = MockServer::start().await;
        let au10tix = MockServer::start().await;

        let mut settings = test_settings(&sdo, &au10tix);
        customize(&mut settings);

        let state = AppState::from_settings(settings).expect("Failed to build application state");
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            address: format!("http://127.0.0.1:{}", port),
            client,
            sdo,
            au10tix,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self) {
        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200, "portal login failed");
    }

    /// Log in to SDO through the portal, against the SDO mock.
    pub async fn connect_sdo(&self) -> reqwest::Response {
        self.post_json(
            "/api/sdo/auth",
            &json!({
                "url": self.sdo.uri(),
                "email": "admin@example.com",
                "password": "sdo-password",
            }),
        )
        .await
    }
}

pub fn with_storage(storage: CredentialStorage) -> impl FnOnce(&mut Settings) {
    move |settings| settings.sdo.credential_storage = storage
}
