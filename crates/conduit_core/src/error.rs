//! Typed failure taxonomy shared by repositories and services.
//!
//! # Responsibility
//! - Classify every failure into a small set of kinds that callers can map
//!   to transport status codes.
//! - Carry per-field validation messages for caller corrections.
//!
//! # Invariants
//! - Backend errors are translated at the repository boundary; services and
//!   callers only ever observe `AppError`.
//! - `Internal` errors are opaque to callers and never retried blindly.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Field name -> list of human-readable messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Failure classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced entity does not exist or an ownership check excluded it.
    NotFound,
    /// Caller input violates a domain rule or a uniqueness constraint.
    Validation,
    /// Operation requires a viewer identity that is absent.
    PermissionDenied,
    /// Unclassified storage or consistency failure.
    Internal,
    /// Caller cancelled the operation or its deadline elapsed.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::PermissionDenied => "permission_denied",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error value.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    fields: FieldErrors,
    #[source]
    source: Option<BoxedSource>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: FieldErrors::new(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Shorthand for a validation error carrying a single field message.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::validation("validation error").with_field(field, message)
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Appends one message to the given field.
    pub fn with_field(mut self, field: &str, message: impl Into<String>) -> Self {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &FieldErrors {
        &self.fields
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Accumulates field violations and turns them into one validation error.
#[derive(Debug, Default)]
pub struct Violations {
    fields: FieldErrors,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Records the error message of `result` under `field` when it failed.
    pub fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.fields.is_empty() {
            return Ok(());
        }
        let mut err = AppError::validation("validation error");
        err.fields = self.fields;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorKind, Violations};

    #[test]
    fn display_includes_kind_and_message() {
        let err = AppError::not_found("article not found");
        assert_eq!(err.to_string(), "not_found: article not found");
    }

    #[test]
    fn violations_collect_per_field_messages() {
        let mut violations = Violations::new();
        violations.add("email", "is required");
        violations.add("email", "is not a valid email address");
        violations.add("username", "is required");

        let err = violations.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.fields()["email"].len(), 2);
        assert_eq!(err.fields()["username"], vec!["is required".to_string()]);
    }

    #[test]
    fn empty_violations_are_ok() {
        assert!(Violations::new().into_result().is_ok());
    }
}
