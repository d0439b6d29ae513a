use service_core::error::AppError;
use thiserror::Error;

/// Failures of the portal's own operations.
///
/// Converted into [`AppError`] at the HTTP boundary; messages are safe to show
/// in the portal UI.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Not authenticated with Secret Double Octopus. Please authenticate first.")]
    CredentialAbsent,

    #[error("Invalid Au10tix token: {0}")]
    InvalidToken(String),

    #[error("Au10tix token has expired")]
    TokenExpired,

    #[error("External API error (status {status})")]
    ExternalApi { status: u16, body: String },

    /// 2xx answer missing a field the portal depends on.
    #[error("{service} response is missing {field}")]
    IncompleteResponse {
        service: &'static str,
        field: &'static str,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("External API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PortalError {
    pub fn external(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        PortalError::ExternalApi {
            status: status.as_u16(),
            body: body.into(),
        }
    }

    /// The upstream rejected our bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PortalError::ExternalApi { status: 401, .. })
    }

    /// Token could not be obtained or used; surfaced even from read-only checks.
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            PortalError::InvalidToken(_) | PortalError::TokenExpired | PortalError::Configuration(_)
        )
    }
}

impl From<PortalError> for AppError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::CredentialAbsent => AppError::Unauthorized(anyhow::anyhow!("{}", err)),
            PortalError::InvalidToken(_) | PortalError::TokenExpired => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            PortalError::ExternalApi { status: 401, .. } => AppError::Unauthorized(anyhow::anyhow!(
                "Authentication failed. Please re-authenticate."
            )),
            PortalError::ExternalApi { status, ref body } => {
                tracing::warn!(status, body = %body, "External API call failed");
                AppError::BadGateway(format!("external API returned status {}", status))
            }
            PortalError::IncompleteResponse { .. } => {
                tracing::warn!(error = %err, "External API answered without a required field");
                AppError::BadGateway(err.to_string())
            }
            PortalError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            PortalError::NotFound(_) => AppError::NotFound(anyhow::anyhow!("{}", err)),
            PortalError::InvalidRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            PortalError::Transport(e) => {
                tracing::warn!(error = %e, "External API unreachable");
                AppError::BadGateway("external API unreachable".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn upstream_unauthorized_becomes_401() {
        let err = PortalError::ExternalApi {
            status: 401,
            body: "expired".into(),
        };
        assert!(err.is_unauthorized());
        assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn other_upstream_failures_become_bad_gateway() {
        let err = PortalError::ExternalApi {
            status: 500,
            body: "boom".into(),
        };
        assert!(!err.is_unauthorized());
        assert_eq!(AppError::from(err).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn incomplete_response_names_the_missing_field() {
        let err = PortalError::IncompleteResponse {
            service: "Au10tix workflow",
            field: "securemeLink",
        };
        let app_err = AppError::from(err);
        assert_eq!(app_err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            app_err.to_string(),
            "Bad Gateway: Au10tix workflow response is missing securemeLink"
        );
    }

    #[test]
    fn token_failures_are_flagged() {
        assert!(PortalError::TokenExpired.is_token_failure());
        assert!(PortalError::InvalidToken("bad".into()).is_token_failure());
        assert!(PortalError::Configuration("none".into()).is_token_failure());
        assert!(!PortalError::NotFound("Verification session".into()).is_token_failure());
    }

    #[test]
    fn absent_credential_is_unauthorized() {
        assert_eq!(
            AppError::from(PortalError::CredentialAbsent).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
