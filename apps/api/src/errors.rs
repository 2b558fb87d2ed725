use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::estimation::encoder::EncodingError;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// A single way in which a model response broke the output contract.
/// `path` is dotted, with array indices: `recommendations.skillImprovement[0].skill`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    pub problem: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every way an estimate can fail. Crosses the boundary as a value;
/// callers can always tell input problems from model problems.
#[derive(Debug, Error)]
pub enum EstimationFailure {
    /// Malformed, oversized or disallowed request. Never retried.
    #[error("Invalid input: {}", join_fields(.errors))]
    InvalidInput { errors: Vec<FieldError> },

    /// The document could not be carried to the model. Never retried.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Transport failure, timeout or non-2xx upstream response after all attempts.
    #[error("Model invocation error after {attempts} attempt(s): {message}")]
    ModelInvocation {
        message: String,
        status: Option<u16>,
        timed_out: bool,
        attempts: u32,
    },

    /// The model answered, but not with a conforming estimate.
    /// `raw` holds the last response for diagnostics.
    #[error("Contract violation: {}", join_violations(.violations))]
    ContractViolation {
        violations: Vec<Violation>,
        raw: String,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl EstimationFailure {
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        EstimationFailure::InvalidInput {
            errors: vec![FieldError {
                field,
                message: message.into(),
            }],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EstimationFailure::InvalidInput { .. } => "INVALID_INPUT",
            EstimationFailure::Encoding(_) => "ENCODING_ERROR",
            EstimationFailure::ModelInvocation { .. } => "MODEL_INVOCATION_ERROR",
            EstimationFailure::ContractViolation { .. } => "CONTRACT_VIOLATION",
            EstimationFailure::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<EncodingError> for EstimationFailure {
    fn from(e: EncodingError) -> Self {
        EstimationFailure::Encoding(e.to_string())
    }
}

impl IntoResponse for EstimationFailure {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, body) = match &self {
            EstimationFailure::InvalidInput { errors } => {
                let mut fields: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
                for e in errors {
                    fields.entry(e.field).or_default().push(e.message.as_str());
                }
                (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "code": code,
                        "message": "Invalid form data. Please check the fields and try again.",
                        "fields": fields,
                    }),
                )
            }
            EstimationFailure::Encoding(msg) => {
                tracing::error!("Encoding error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": code,
                        "message": "The uploaded document could not be processed",
                    }),
                )
            }
            EstimationFailure::ModelInvocation {
                message,
                status,
                timed_out,
                attempts,
            } => {
                tracing::error!(
                    "Model invocation error (upstream status {status:?}, {attempts} attempts): {message}"
                );
                let status = if *timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (
                    status,
                    json!({
                        "code": code,
                        "message": "An AI error occurred. Please try again.",
                    }),
                )
            }
            EstimationFailure::ContractViolation { violations, raw } => {
                tracing::error!(
                    "Contract violation ({} problems): {}; raw response: {raw}",
                    violations.len(),
                    join_violations(violations)
                );
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "code": code,
                        "message": "The AI returned an incomplete estimate. Please try again.",
                        "violations": violations,
                    }),
                )
            }
            EstimationFailure::Unknown(msg) => {
                tracing::error!("Unknown estimation error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": code,
                        "message": "An internal server error occurred",
                    }),
                )
            }
        };

        (status, Json(json!({ "error": body }))).into_response()
    }
}
