//! Supervisor error taxonomy, with the HTTP mapping used by the IPC layer.
//!
//! Launch and stop failures are returned to the caller and never silently
//! swallowed. Reconciler corrections are deliberately absent here: they are
//! observable state fixes, not errors.

use axum::http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Bot '{0}' not found")]
    BotNotFound(String),

    #[error("Bot '{0}' is already running")]
    AlreadyRunning(String),

    #[error("No process registered for bot '{0}'")]
    ProcessNotFound(String),

    #[error("Bot '{0}' is running; stop it first")]
    BotRunning(String),

    #[error("No launch strategy for bot '{0}'")]
    UnresolvedStrategy(String),

    #[error("Compile step failed: {0}")]
    CompileFailed(String),

    #[error("Failed to spawn bot process: {0}")]
    SpawnFailed(String),

    #[error("Credential does not match the expected shape")]
    InvalidCredential,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<super::registry::RegistryError> for SupervisorError {
    fn from(e: super::registry::RegistryError) -> Self {
        Self::Internal(anyhow::Error::from(e))
    }
}

impl SupervisorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BotNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) | Self::ProcessNotFound(_) | Self::BotRunning(_) => {
                StatusCode::CONFLICT
            }
            Self::InvalidCredential => StatusCode::BAD_REQUEST,
            Self::CompileFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnresolvedStrategy(_) | Self::SpawnFailed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BotNotFound(_) => "BOT_NOT_FOUND",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::ProcessNotFound(_) => "PROCESS_NOT_FOUND",
            Self::BotRunning(_) => "BOT_RUNNING",
            Self::UnresolvedStrategy(_) => "UNRESOLVED_STRATEGY",
            Self::CompileFailed(_) => "COMPILE_FAILED",
            Self::SpawnFailed(_) => "SPAWN_FAILED",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
