use crate::error::PortalError;
use crate::models::Credential;
use crate::services::sdo_client::{InvitationKind, InvitationRequest};
use crate::utils::extract::{extract_enrollment_url, looks_like_invitation_id};
use crate::utils::qr::qr_png_data_url;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use tower_sessions::Session;
use validator::Validate;

#[derive(Deserialize, Validate)]
pub struct SdoAuthRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub user_id: String,
    #[serde(default)]
    pub invitation_types: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<InvitationKind>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    pub invitation_id: String,
}

#[derive(Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub id: String,
}

async fn require_credential(state: &AppState, session: &Session) -> Result<Credential, AppError> {
    state
        .credentials
        .resolve(session)
        .await
        .ok_or_else(|| PortalError::CredentialAbsent.into())
}

/// Drop the session's credential when SDO rejected it, then surface the error.
async fn upstream_failure(state: &AppState, session: &Session, err: PortalError) -> AppError {
    if err.is_unauthorized() {
        tracing::warn!("SDO token rejected, clearing stored credential");
        state.credentials.invalidate(session).await;
    }
    err.into()
}

pub async fn sdo_auth(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<SdoAuthRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let credential = state
        .sdo
        .login(payload.url.as_deref(), &payload.email, &payload.password)
        .await?;
    state
        .credentials
        .store(&session, &credential)
        .await
        .map_err(AppError::InternalError)?;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully authenticated with Secret Double Octopus",
        "status": "authenticated",
        "base_url": credential.base_url(),
        "token_length": credential.token_len(),
    })))
}

pub async fn sdo_status(State(state): State<AppState>, session: Session) -> Json<Value> {
    match state.credentials.resolve(&session).await {
        Some(credential) => Json(json!({
            "authenticated": true,
            "status": "authenticated",
            "base_url": credential.base_url(),
            "email": credential.email(),
            "token_length": credential.token_len(),
            "acquired_at": credential.acquired_at(),
        })),
        None => Json(json!({
            "authenticated": false,
            "status": "unauthenticated",
        })),
    }
}

pub async fn sdo_logout(State(state): State<AppState>, session: Session) -> Json<Value> {
    state.credentials.invalidate(&session).await;
    tracing::info!("Disconnected from SDO");

    Json(json!({
        "success": true,
        "message": "Disconnected from Secret Double Octopus",
        "status": "unauthenticated",
    }))
}

/// Log in without keeping the credential.
pub async fn test_connection(
    State(state): State<AppState>,
    Json(payload): Json<SdoAuthRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let credential = state
        .sdo
        .login(payload.url.as_deref(), &payload.email, &payload.password)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Connection to Secret Double Octopus successful",
        "base_url": credential.base_url(),
        "token_length": credential.token_len(),
    })))
}

pub async fn search_users(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Value>>, AppError> {
    let term = query.q.trim();
    if term.chars().count() < 2 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Search term must be at least 2 characters"
        )));
    }

    let credential = require_credential(&state, &session).await?;
    match state.sdo.search_users(&credential, term).await {
        Ok(users) => Ok(Json(users)),
        Err(e) => Err(upstream_failure(&state, &session, e).await),
    }
}

pub async fn send_invitation(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<InviteRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("userId is required")));
    }
    let request = match payload.kind {
        Some(kind) => InvitationRequest::Single { kind },
        None if !payload.invitation_types.is_empty() => InvitationRequest::Types {
            invite: true,
            invitation_types: payload.invitation_types,
        },
        None => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "invitationTypes or type is required"
            )))
        }
    };

    let credential = require_credential(&state, &session).await?;
    let outcome = match state
        .sdo
        .send_invitation(&credential, &payload.user_id, &request)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return Err(upstream_failure(&state, &session, e).await),
    };

    let mut response = json!({
        "success": true,
        "message": "Invitation sent successfully",
        "rawResponse": outcome.raw,
    });
    if let Some(details) = outcome.raw.get("invitation") {
        response["invitationDetails"] = details.clone();
    }
    if let Some(id) = outcome.invitation_id {
        response["id"] = json!(id);
        response["invitationId"] = json!(id);
    }

    Ok(Json(response))
}

pub async fn invitation_details(
    State(state): State<AppState>,
    session: Session,
    Path(invitation_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let credential = require_credential(&state, &session).await?;
    let details = match state.sdo.invitation_details(&credential, &invitation_id).await {
        Ok(details) => details,
        Err(e) => return Err(upstream_failure(&state, &session, e).await),
    };

    let enrollment_url = extract_enrollment_url(&details)
        .unwrap_or_else(|| state.sdo.enrollment_url(credential.host(), &invitation_id));

    Ok(Json(json!({
        "success": true,
        "invitation": details,
        "enrollment_url": enrollment_url,
    })))
}

pub async fn generate_qr(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<QrRequest>,
) -> Result<Json<Value>, AppError> {
    let invitation_id = payload.invitation_id.trim();
    if !looks_like_invitation_id(invitation_id) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid invitation ID format"
        )));
    }

    let credential = state.credentials.resolve(&session).await;
    let host = credential
        .as_ref()
        .map(|c| c.host().to_string())
        .unwrap_or_else(|| state.sdo.default_host());
    let qr_data = state.sdo.enrollment_url(&host, invitation_id);
    let qr_image = qr_png_data_url(&qr_data)?;

    tracing::info!(invitation_id = %invitation_id, "Generated enrollment QR code");
    Ok(Json(json!({
        "success": true,
        "qr_data": qr_data,
        "qr_image": qr_image,
        "invitation_id": invitation_id,
        "test_mode": credential.is_none(),
    })))
}

pub async fn validate_invitation(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ValidateQuery>,
) -> Json<Value> {
    let id = query.id.trim();
    let valid = looks_like_invitation_id(id);

    let mut response = json!({
        "valid": valid,
        "length": id.chars().count(),
    });
    if valid {
        let host = match state.credentials.resolve(&session).await {
            Some(credential) => credential.host().to_string(),
            None => state.sdo.default_host(),
        };
        response["enrollment_url"] = json!(state.sdo.enrollment_url(&host, id));
    }
    Json(response)
}

pub async fn check_portal(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    let credential = require_credential(&state, &session).await?;
    let check = state.sdo.check_portal(&credential).await;
    if check.status_code == 401 {
        tracing::warn!("SDO portal rejected the token, clearing stored credential");
        state.credentials.invalidate(&session).await;
    }

    Ok(Json(json!({
        "success": check.accessible,
        "accessible": check.accessible,
        "status_code": check.status_code,
        "portal_url": check.portal_url,
    })))
}
