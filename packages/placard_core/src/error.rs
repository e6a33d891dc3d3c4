//! Error taxonomy, error codes, and the serializable error response.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Field-level detail carried by [`QueryError::Validation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("backend failure: {0}")]
    Backend(#[source] BoxError),
}

impl QueryError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_error",
            Self::InvalidPagination(_) => "invalid_pagination",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::Backend(_) => "backend",
        }
    }

    /// Caller errors are surfaced as-is; only backend failures are the store's problem.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

impl From<ValidationErrors> for QueryError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Serializable error payload for the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl From<&QueryError> for ErrorResponse {
    fn from(err: &QueryError) -> Self {
        let fields = match err {
            QueryError::Validation(errors) => errors.fields.clone(),
            _ => Vec::new(),
        };
        Self {
            error: err.error_code().to_string(),
            message: err.to_string(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(QueryError::Unauthorized.error_code(), "unauthorized");
        assert_eq!(
            QueryError::not_found("placement", "p-1").error_code(),
            "not_found"
        );
        assert_eq!(
            QueryError::InvalidCursor("bad".into()).error_code(),
            "invalid_cursor"
        );
        assert_eq!(
            QueryError::backend(std::io::Error::other("disk")).error_code(),
            "backend"
        );
    }

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = QueryError::not_found("placement", "p-1");
        assert_eq!(err.to_string(), "placement not found: p-1");
    }

    #[test]
    fn validation_errors_collect_fields() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.push("name", "is required");
        errors.push("reserve_pct", "must be between 0 and 1");
        let err = QueryError::from(errors.into_result().unwrap_err());
        assert_eq!(
            err.to_string(),
            "validation failed: name: is required; reserve_pct: must be between 0 and 1"
        );
    }

    #[test]
    fn error_response_carries_field_detail() {
        let err = QueryError::from(ValidationErrors::single("name", "must be unique"));
        let resp = ErrorResponse::from(&err);
        let json = serde_json::to_string(&resp).unwrap();
        let back: ErrorResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error, "validation_error");
        assert_eq!(back.fields.len(), 1);
        assert_eq!(back.fields[0].field, "name");
    }

    #[test]
    fn error_response_omits_empty_fields() {
        let resp = ErrorResponse::from(&QueryError::Unauthorized);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("fields").is_none());
        assert_eq!(json["error"], "unauthorized");
    }
}
