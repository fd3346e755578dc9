//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use biocage_core::CoreError;
use biocage_executor::ExecutorError;
use serde_json::json;
use uuid::Uuid;

/// Errors that can occur during gateway request handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// An error propagated from the executor layer.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// A request value failed domain validation (memory spec, CPU count, path).
    #[error("invalid configuration: {0}")]
    Config(#[from] CoreError),

    /// The requested sandbox ID does not exist in the pool.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(Uuid),

    /// The request body is malformed or contains invalid values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_)
            | Self::InvalidRequest(_)
            | Self::Executor(ExecutorError::Config(_)) => StatusCode::BAD_REQUEST,
            Self::SandboxNotFound(_) => StatusCode::NOT_FOUND,
            Self::Executor(ExecutorError::AlreadyRunning | ExecutorError::NotRunning) => {
                StatusCode::CONFLICT
            }
            Self::Executor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn gateway_error_status_codes_map_correctly() {
        let not_found = GatewayError::SandboxNotFound(Uuid::nil());
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let bad_req = GatewayError::InvalidRequest("missing field".to_owned());
        assert_eq!(bad_req.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn configuration_errors_return_400() {
        let missing = CoreError::HostPathNotFound { path: PathBuf::from("/nope") };
        let wrapped = GatewayError::Executor(ExecutorError::Config(missing));
        assert_eq!(wrapped.status(), StatusCode::BAD_REQUEST);

        let cpu = GatewayError::Config(CoreError::InvalidCpuLimit { value: -1.0 });
        assert_eq!(cpu.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lifecycle_misuse_returns_409() {
        for misuse in [ExecutorError::NotRunning, ExecutorError::AlreadyRunning] {
            assert_eq!(GatewayError::Executor(misuse).status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn gateway_error_executor_variant_returns_500() {
        let exec_err = ExecutorError::LaunchFailed("daemon died".to_owned());
        let resp = GatewayError::Executor(exec_err).into_response();
        assert_eq!(
            resp.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "Executor errors must map to 500"
        );
    }

    #[test]
    fn gateway_error_display_includes_message() {
        let err = GatewayError::InvalidRequest("bad timeout".to_owned());
        assert!(err.to_string().contains("bad timeout"), "Display must include the message");
    }
}
