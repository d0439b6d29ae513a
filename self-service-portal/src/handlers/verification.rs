use crate::error::PortalError;
use crate::models::{SubjectData, VerificationResult, VerificationSession, VerificationStatus};
use crate::services::au10tix_client::resolve_token;
use crate::utils::jwt::decode_unexpired;
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSessionView {
    pub session_id: Option<String>,
    pub session_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatusResponse {
    pub success: bool,
    pub verification_id: Uuid,
    pub status: VerificationStatus,
    pub result: Option<VerificationResult>,
    pub score: Option<f64>,
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_data: SubjectData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub au10tix_session: Option<ExternalSessionView>,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<&'static str>,
    /// Set when polling was skipped because the Au10tix token is unusable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_error: Option<String>,
}

impl VerificationStatusResponse {
    fn new(session: VerificationSession, token_error: Option<String>) -> Self {
        let next_step = (session.status == VerificationStatus::Pending && session.external.is_some())
            .then_some("User should complete verification at the provided session URL");

        Self {
            success: true,
            verification_id: session.id,
            status: session.status,
            result: session.result,
            score: session.score,
            message: session.status_message(),
            next_step,
            au10tix_session: session.external.map(|external| ExternalSessionView {
                session_id: external.id,
                session_url: external.url,
            }),
            data: session.data,
            created_at: session.created_at,
            updated_at: session.updated_at,
            user_data: session.subject,
            token_error,
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| PortalError::NotFound("Verification session".to_string()).into())
}

pub async fn start_verification(
    State(state): State<AppState>,
    Json(subject): Json<SubjectData>,
) -> Result<Json<Value>, AppError> {
    subject.validate()?;

    let started = state.verification.start(subject).await?;

    let mut response = json!({
        "success": true,
        "verificationId": started.verification_id,
        "sessionUrl": started.session_url,
        "tokenSource": started.token_source,
    });
    if started.token_source.is_demo() {
        response["message"] = json!("Demo mode - using static fallback token");
    }

    Ok(Json(response))
}

/// Poll Au10tix for the session, then report its state.
pub async fn verification_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VerificationStatusResponse>, AppError> {
    let id = parse_id(&id)?;

    match state.verification.refresh(&id).await {
        Ok(session) => Ok(Json(VerificationStatusResponse::new(session, None))),
        Err(e) if e.is_token_failure() => {
            tracing::warn!(verification_id = %id, error = %e, "Status check could not poll Au10tix");
            let session = state.verification.get(&id)?;
            Ok(Json(VerificationStatusResponse::new(session, Some(e.to_string()))))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn verification_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    let session = state.verification.get(&id)?;

    let external = session
        .external
        .ok_or_else(|| PortalError::NotFound("Verification session URL".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "verificationId": id,
        "sessionUrl": external.url,
    })))
}

pub async fn list_verifications(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.verification.list();

    Json(json!({
        "success": true,
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

pub async fn check_pending_verifications(State(state): State<AppState>) -> Json<Value> {
    let checks = state.verification.check_pending().await;

    let results: Vec<Value> = checks
        .into_iter()
        .map(|check| {
            let mut entry = json!({
                "verificationId": check.before.id,
                "createdAt": check.before.created_at,
                "userData": check.before.subject,
            });
            match check.outcome {
                Ok(session) => {
                    entry["status"] = json!(session.status);
                    entry["result"] = json!(session.result);
                    entry["score"] = json!(session.score);
                }
                Err(e) => {
                    entry["status"] = json!("error");
                    entry["error"] = json!(e.to_string());
                }
            }
            entry
        })
        .collect();

    Json(json!({
        "success": true,
        "message": format!("Checked {} pending verifications", results.len()),
        "results": results,
    }))
}

/// Report what the configured Au10tix token grants, without calling Au10tix.
pub async fn test_au10tix_connection(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let settings = state.verification.au10tix_settings();
    let resolved = resolve_token(settings)?;

    if resolved.source.is_demo() {
        return Ok(Json(json!({
            "success": true,
            "demo_mode": true,
            "token_source": resolved.source,
            "message": "No Au10tix token configured, running in demo mode",
        })));
    }

    let claims = decode_unexpired(resolved.token.expose_secret(), Utc::now())?;

    Ok(Json(json!({
        "success": true,
        "demo_mode": false,
        "token_source": resolved.source,
        "organization": claims.client_organization_name,
        "organization_id": claims.client_organization_id,
        "api_url": claims.api_base_url(&settings.base_url),
        "subject": claims.sub,
        "bos_url": claims.bos_url,
        "issued_at": claims.issued_at(),
        "expires_at": claims.expires_at(),
        "scopes": claims.scp,
    })))
}
