//! Server error types.

use hyper::StatusCode;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] primflow_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] primflow_storage::StorageError),

    #[error("{0}")]
    Run(#[from] primflow_core::RunError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the error code carried in JSON error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Io(_) => "INTERNAL_ERROR",
            ServerError::Core(e) => e.error_code(),
            ServerError::Storage(e) => e.error_code(),
            ServerError::Run(e) => e.error_code(),
            ServerError::Json(_) => "BAD_REQUEST",
            ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::StateNotFound(_) => "STATE_NOT_FOUND",
            ServerError::RouteNotFound { .. } => "NOT_FOUND",
            ServerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Maps the error to an HTTP status.
    pub fn status(&self) -> StatusCode {
        match self.error_code() {
            "BAD_REQUEST" | "INVALID_STATE" => StatusCode::BAD_REQUEST,
            "STATE_NOT_FOUND" | "NOT_FOUND" => StatusCode::NOT_FOUND,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "PRIMITIVE_NOT_FOUND" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primflow_core::CoreError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::StateNotFound("A".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::PayloadTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServerError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_core_codes_pass_through() {
        let err = ServerError::from(CoreError::PrimitiveNotFound {
            name: "nope".to_string(),
        });
        assert_eq!(err.error_code(), "PRIMITIVE_NOT_FOUND");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ServerError::from(CoreError::InvalidDefinition {
            reason: "dup".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
