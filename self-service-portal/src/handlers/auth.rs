use crate::handlers::session_error;
use crate::models::operator::OPERATOR_SESSION_KEY;
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use subtle::ConstantTimeEq;
use tower_sessions::Session;
use validator::Validate;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

pub async fn login_page() -> impl IntoResponse {
    LoginTemplate {}
}

fn credentials_match(state: &AppState, username: &str, password: &str) -> bool {
    let portal = &state.settings.portal;
    let user_ok = username.as_bytes().ct_eq(portal.admin_username.as_bytes());
    let pass_ok = password
        .as_bytes()
        .ct_eq(portal.admin_password.expose_secret().as_bytes());
    bool::from(user_ok & pass_ok)
}

/// Connect to SDO with the configured service account, if there is one.
async fn auto_connect_sdo(state: &AppState, session: &Session) -> bool {
    let sdo = &state.settings.sdo;
    let (Some(email), Some(password)) = (sdo.email.as_deref(), sdo.password.as_ref()) else {
        return false;
    };

    match state.sdo.login(None, email, password.expose_secret()).await {
        Ok(credential) => match state.credentials.store(session, &credential).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to store SDO credential after portal login");
                false
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Automatic SDO authentication failed");
            false
        }
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    if !credentials_match(&state, &payload.username, &payload.password) {
        tracing::warn!(username = %payload.username, "Rejected portal login");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid portal credentials")));
    }

    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(OPERATOR_SESSION_KEY, &payload.username)
        .await
        .map_err(session_error)?;

    let sdo_connected = auto_connect_sdo(&state, &session).await;
    tracing::info!(username = %payload.username, sdo_connected, "Operator logged in");

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "redirect": "/dashboard",
        "sdo_connected": sdo_connected,
    })))
}

async fn end_session(state: &AppState, session: &Session) -> Result<(), AppError> {
    state.credentials.invalidate(session).await;
    session.flush().await.map_err(session_error)
}

pub async fn logout_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    end_session(&state, &session).await?;
    tracing::info!("Operator logged out");

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully",
    })))
}

pub async fn logout_page(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    if let Err(e) = end_session(&state, &session).await {
        tracing::error!(error = %e, "Failed to clear session on logout");
    }
    Redirect::to("/login")
}

pub async fn check_auth(session: Session) -> Json<Value> {
    match session
        .get::<String>(OPERATOR_SESSION_KEY)
        .await
        .unwrap_or(None)
    {
        Some(username) => Json(json!({ "authenticated": true, "username": username })),
        None => Json(json!({ "authenticated": false })),
    }
}
