//! Core error types.

use crate::runner::StepRecord;
use thiserror::Error;

/// Infrastructure failures raised by a primitive.
///
/// Business outcomes (a declined payment, an invalid order) are reported
/// through [`PrimitiveResult`](crate::PrimitiveResult) with `success = false`.
/// This type is reserved for conditions that must abort the run.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("dependency unavailable: {dependency}: {reason}")]
    Unavailable { dependency: String, reason: String },

    #[error("malformed context entry '{key}': {reason}")]
    MalformedContext { key: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors from the execution engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("primitive not found: {name}")]
    PrimitiveNotFound { name: String },

    #[error("primitive '{primitive}' failed: {source}")]
    Primitive {
        primitive: String,
        #[source]
        source: PrimitiveError,
    },

    #[error("invalid state definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns an error code suitable for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::PrimitiveNotFound { .. } => "PRIMITIVE_NOT_FOUND",
            CoreError::Primitive { .. } => "PRIMITIVE_ERROR",
            CoreError::InvalidDefinition { .. } => "BAD_REQUEST",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}

/// A state aborted on an infrastructure error.
///
/// Carries the state's failure transition so callers that want to route
/// around the error still know where the graph would have gone.
#[derive(Debug, Error)]
#[error("state '{state}' aborted: {source}")]
pub struct StateError {
    pub state: String,
    pub failure_transition: Option<String>,
    #[source]
    pub source: CoreError,
}

/// A workflow run aborted on an infrastructure error.
#[derive(Debug, Error)]
#[error("run {run_id} aborted after {} step(s): {source}", .steps.len())]
pub struct RunError {
    pub run_id: String,
    /// States that completed before the failing one.
    pub steps: Vec<StepRecord>,
    #[source]
    pub source: StateError,
}

impl RunError {
    pub fn error_code(&self) -> &'static str {
        self.source.source.error_code()
    }
}
