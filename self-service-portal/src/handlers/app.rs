use crate::models::operator::OPERATOR_SESSION_KEY;
use crate::models::Operator;
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    Json,
};
use serde_json::{json, Value};
use tower_sessions::Session;

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub username: String,
    pub initials: String,
    pub sdo_default_url: String,
    pub current_page: &'static str,
}

pub async fn index(session: Session) -> impl IntoResponse {
    let logged_in = session
        .get::<String>(OPERATOR_SESSION_KEY)
        .await
        .unwrap_or(None)
        .is_some();

    if logged_in {
        Redirect::to("/dashboard")
    } else {
        Redirect::to("/login")
    }
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "self-service-portal",
    }))
}

pub async fn dashboard_handler(State(state): State<AppState>, operator: Operator) -> impl IntoResponse {
    DashboardTemplate {
        initials: operator.initials(),
        username: operator.username,
        sdo_default_url: state.settings.sdo.default_url.clone(),
        current_page: "dashboard",
    }
}
