use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

/// Session key holding the logged-in operator's username.
pub const OPERATOR_SESSION_KEY: &str = "portal_user";

/// The portal operator behind the current request.
#[derive(Debug, Clone)]
pub struct Operator {
    pub username: String,
}

impl Operator {
    pub fn initials(&self) -> String {
        let initials: String = self.username.chars().take(2).collect();
        if initials.is_empty() {
            "OP".to_string()
        } else {
            initials.to_uppercase()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract session",
                )
                    .into_response()
            })?;

        match session
            .get::<String>(OPERATOR_SESSION_KEY)
            .await
            .unwrap_or(None)
        {
            Some(username) if !username.is_empty() => Ok(Operator { username }),
            _ => Err(Redirect::to("/login").into_response()),
        }
    }
}
