pub mod app;
pub mod auth;
pub mod metrics;
pub mod sdo;
pub mod verification;

use service_core::error::AppError;

/// Turn a session store failure into a 500.
pub(crate) fn session_error(e: tower_sessions::session::Error) -> AppError {
    tracing::error!(error = %e, "Session store failure");
    AppError::InternalError(anyhow::anyhow!("Session store failure"))
}
