//! Typed rule violations raised by the ledger rules

use rust_decimal::Decimal;
use thiserror::Error;

/// A broken ledger rule
///
/// Each variant corresponds to one error kind surfaced to callers. The
/// backend maps them onto HTTP responses; nothing in this crate retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid {field}: {message}")]
    Input { field: String, message: String },
}

impl RuleViolation {
    pub fn input(field: &str, message: impl Into<String>) -> Self {
        RuleViolation::Input {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        RuleViolation::NotFound(resource.into())
    }

    /// Stable machine-readable code for the violation kind
    pub fn code(&self) -> &'static str {
        match self {
            RuleViolation::NotFound(_) => "NOT_FOUND",
            RuleViolation::Unauthorized(_) => "FORBIDDEN",
            RuleViolation::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            RuleViolation::Conflict(_) => "CONFLICT",
            RuleViolation::Input { .. } => "VALIDATION_ERROR",
        }
    }
}
