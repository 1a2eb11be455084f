//! Failure taxonomy returned by the request pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How serious a validation or business-rule error is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One structured failure entry: which field, what went wrong, a stable code
/// for clients, and how serious it is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Every way a request can fail.
///
/// Validation, business-rule and not-found failures are expected control flow
/// and are returned as values. `Unexpected` carries the underlying error for
/// logging; it must never be rendered to a caller verbatim.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed ({} error(s))", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    #[error("business rule violated: {}", .0.message)]
    BusinessRuleViolation(ValidationError),

    #[error("request cancelled")]
    Cancelled,

    #[error("unexpected failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl Failure {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(error: ValidationError) -> Self {
        Self::ValidationFailed(vec![error])
    }

    /// Stable, detail-free label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::BusinessRuleViolation(_) => "business_rule_violation",
            Self::Cancelled => "cancelled",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl From<rusqlite::Error> for Failure {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unexpected(e.into())
    }
}

pub type Outcome<T> = std::result::Result<T, Failure>;
