use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Field name -> human readable validation message.
pub type FieldErrors = BTreeMap<String, String>;

/// Errors from repository operations (used by trait definitions in flho-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    /// Optimistic concurrency check failed (stored version moved on).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Machine readable discriminant of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    EditConflict,
    InvalidArgument,
    TransportFailure,
    InternalFailure,
}

/// Error taxonomy surfaced by workflow and run operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed workflow/state definition or paging filter.
    #[error("validation failed: {}", render_fields(.fields))]
    ValidationFailed { fields: FieldErrors },

    /// The named entity ("workflow", "run", "identity") does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Optimistic concurrency violation. Never retried by the core.
    #[error("edit conflict: record was modified concurrently")]
    EditConflict,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Retry target unreachable or answered with a non-2xx status.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            FlowError::NotFound(_) => ErrorKind::NotFound,
            FlowError::EditConflict => ErrorKind::EditConflict,
            FlowError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FlowError::TransportFailure(_) => ErrorKind::TransportFailure,
            FlowError::InternalFailure(_) => ErrorKind::InternalFailure,
        }
    }

    /// Field errors for `ValidationFailed`, empty for every other kind.
    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            FlowError::ValidationFailed { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn validation(fields: FieldErrors) -> Self {
        FlowError::ValidationFailed { fields }
    }

    /// Map a repository error for the given entity.
    pub fn from_repository(entity: &'static str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => FlowError::NotFound(entity),
            RepositoryError::Conflict(_) => FlowError::EditConflict,
            other => FlowError::InternalFailure(other.to_string()),
        }
    }
}

impl From<RepositoryError> for FlowError {
    fn from(err: RepositoryError) -> Self {
        FlowError::from_repository("record", err)
    }
}

fn render_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, msg)| format!("{field}: {msg}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let mut fields = FieldErrors::new();
        fields.insert("states".to_string(), "must have at least 2 values".to_string());
        fields.insert("name".to_string(), "must be provided".to_string());
        let err = FlowError::validation(fields);

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(
            err.to_string(),
            "validation failed: name: must be provided, states: must have at least 2 values"
        );
        assert_eq!(err.fields().map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_repository_conflict_maps_to_edit_conflict() {
        let err = FlowError::from_repository("run", RepositoryError::Conflict("v3".into()));
        assert_eq!(err.kind(), ErrorKind::EditConflict);

        let err = FlowError::from_repository("run", RepositoryError::NotFound);
        assert_eq!(err.to_string(), "run not found");

        let err: FlowError = RepositoryError::Connection.into();
        assert_eq!(err.kind(), ErrorKind::InternalFailure);
    }

    #[test]
    fn test_error_kind_serializes_screaming() {
        let json = serde_json::to_string(&ErrorKind::EditConflict).unwrap();
        assert_eq!(json, "\"EDIT_CONFLICT\"");
    }
}
