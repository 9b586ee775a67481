//! Error types and exit codes for plgrade
//!
//! Exit codes:
//! - 0: Success
//! - 1: Generic failure (storage, IO, rejected grading)
//! - 2: Usage error or invalid input (bad flags, unknown rubric item, ...)
//! - 3: Data error (referenced record not found)
//!
//! Grading conflicts and unauthorized job-sequence joins are not errors.
//! They are returned as result values so callers can branch on them.

mod macros;

use thiserror::Error;

/// Exit codes for the plgrade binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success (0)
    Success = 0,
    /// Generic failure (1)
    Failure = 1,
    /// Usage error or invalid input (2)
    Usage = 2,
    /// Referenced record not found (3)
    Data = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<rusqlite::Error> for GradeError {
    fn from(err: rusqlite::Error) -> Self {
        GradeError::FailedOperation {
            operation: "query database".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors that can occur during grading operations
#[derive(Error, Debug)]
pub enum GradeError {
    // Usage errors (exit code 2)
    #[error("unknown format: {0} (expected: human or json)")]
    UnknownFormat(String),

    #[error("{0}")]
    UsageError(String),

    #[error("invalid {context}: {value}")]
    InvalidInput { context: String, value: String },

    // Data errors (exit code 3)
    #[error("{context} not found: {value}")]
    NotFound { context: String, value: String },

    // Generic failures (exit code 1)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to {operation}: {reason}")]
    FailedOperation { operation: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl GradeError {
    /// Create an error for a failed database operation
    pub fn db_operation(operation: &str, error: impl std::fmt::Display) -> Self {
        GradeError::FailedOperation {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }

    /// Create an error for input rejected before any mutation
    pub fn invalid_input(context: &str, value: impl std::fmt::Display) -> Self {
        GradeError::InvalidInput {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an error for a record that does not exist
    pub fn not_found(context: &str, value: impl std::fmt::Display) -> Self {
        GradeError::NotFound {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GradeError::NotFound { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, GradeError::InvalidInput { .. })
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            GradeError::UnknownFormat(_)
            | GradeError::UsageError(_)
            | GradeError::InvalidInput { .. } => ExitCode::Usage,

            GradeError::NotFound { .. } => ExitCode::Data,

            GradeError::Io(_)
            | GradeError::Json(_)
            | GradeError::Toml(_)
            | GradeError::FailedOperation { .. }
            | GradeError::Other(_) => ExitCode::Failure,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GradeError::UnknownFormat(_) => "unknown_format",
            GradeError::UsageError(_) => "usage_error",
            GradeError::InvalidInput { .. } => "invalid_input",
            GradeError::NotFound { .. } => "not_found",
            GradeError::Io(_) => "io_error",
            GradeError::Json(_) => "json_error",
            GradeError::Toml(_) => "toml_error",
            GradeError::FailedOperation { .. } => "failed_operation",
            GradeError::Other(_) => "other",
        }
    }

    /// Convert error to JSON representation for structured error output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.exit_code() as i32,
                "type": self.error_type(),
                "message": self.to_string(),
            }
        })
    }
}

/// Result type alias for grading operations
pub type Result<T> = std::result::Result<T, GradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_taxonomy() {
        assert_eq!(
            GradeError::not_found("assessment instance", 7).exit_code(),
            ExitCode::Data
        );
        assert_eq!(
            GradeError::invalid_input("rubric item", "unknown").exit_code(),
            ExitCode::Usage
        );
        assert_eq!(
            GradeError::db_operation("update score", "disk full").exit_code(),
            ExitCode::Failure
        );
    }

    #[test]
    fn test_to_json_envelope() {
        let err = GradeError::not_found("rubric", 3);
        let json = err.to_json();

        assert_eq!(json["error"]["code"], 3);
        assert_eq!(json["error"]["type"], "not_found");
        assert_eq!(json["error"]["message"], "rubric not found: 3");
    }

    fn lookup_instance(known: &[i64], id: i64) -> Result<i64> {
        if id <= 0 {
            crate::bail_invalid!(
                "assessment instance id",
                id,
            );
        }
        if !known.contains(&id) {
            crate::bail_not_found!("assessment instance", id);
        }
        Ok(id)
    }

    #[test]
    fn test_bail_macros_return_typed_errors() {
        assert_eq!(lookup_instance(&[1, 2], 2).unwrap(), 2);
        assert_eq!(
            lookup_instance(&[1, 2], -1).unwrap_err().to_string(),
            "invalid assessment instance id: -1"
        );
        assert!(lookup_instance(&[1, 2], 9).unwrap_err().is_not_found());

        let err = crate::map_db_err!("update score", "disk full");
        assert_eq!(err.to_string(), "failed to update score: disk full");
    }

    #[test]
    fn test_rusqlite_error_maps_to_failed_operation() {
        let err: GradeError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.error_type(), "failed_operation");
    }
}
