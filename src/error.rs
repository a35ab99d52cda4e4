//! Error types for the transfer engine
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Task, Database, Config)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::TaskException;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for transfer engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the transfer engine
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Task transfer failed; carries the classified reason attached to the
    /// terminal status update.
    #[error("task error: {0}")]
    Task(#[from] TaskException),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Task operation invalid given its current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task id that is in an invalid state for the operation
        id: String,
        /// The operation that was attempted (e.g., "pause", "resume", "cancel")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Operation not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
/// It follows a standard format with machine-readable error codes,
/// human-readable messages, and optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "task abc123 not found",
///     "details": {
///       "task_id": "abc123"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    ///
    /// Clients can use this for programmatic error handling.
    pub code: String,

    /// Human-readable error message
    ///
    /// This is suitable for displaying to end users.
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create a "conflict" error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps domain errors to appropriate HTTP status codes.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Task(TaskException::Url { .. }) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Task(TaskException::HttpResponse {
                status_code: 404, ..
            }) => 404,

            // 409 Conflict - Resource already in desired state / resume precondition failed
            Error::InvalidState { .. } => 409,
            Error::Task(TaskException::Resume { .. }) => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
            Error::Task(TaskException::FileSystem { .. }) => 500,
            Error::Task(TaskException::General { .. }) => 500,

            // 502 Bad Gateway - External service errors
            Error::Network(_) => 502,
            Error::Task(TaskException::Connection { .. }) => 502,
            Error::Task(TaskException::HttpResponse { status_code, .. }) if *status_code >= 500 => {
                502
            }
            Error::Task(TaskException::HttpResponse { .. }) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 501 Not Implemented - Feature not supported
            Error::NotSupported(_) => 501,

            // 500 for serialization errors
            Error::Serialization(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Task(e) => match e {
                TaskException::General { .. } => "task_general_error",
                TaskException::Url { .. } => "task_url_error",
                TaskException::HttpResponse { .. } => "task_http_response_error",
                TaskException::Connection { .. } => "task_connection_error",
                TaskException::FileSystem { .. } => "task_file_system_error",
                TaskException::Resume { .. } => "task_resume_error",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidState { .. } => "invalid_state",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::InvalidState {
                id,
                operation,
                current_state,
            } => Some(serde_json::json!({
                "task_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Task(TaskException::HttpResponse { status_code, .. }) => {
                Some(serde_json::json!({
                    "status_code": status_code,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a vec of (Error, expected_status_code, expected_error_code) for
    /// every reachable match arm in ToHttpStatus.
    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("max_concurrent".into()),
                },
                400,
                "config_error",
            ),
            (Error::NotFound("task abc".into()), 404, "not_found"),
            (
                Error::Database(DatabaseError::QueryFailed("timeout".into())),
                500,
                "database_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
            (Error::Other("unknown".into()), 500, "internal_error"),
            (Error::ShuttingDown, 503, "shutting_down"),
            (
                Error::NotSupported("feature X".into()),
                501,
                "not_supported",
            ),
            (
                Error::InvalidState {
                    id: "t1".into(),
                    operation: "pause".into(),
                    current_state: "completed".into(),
                },
                409,
                "invalid_state",
            ),
            (
                Error::Task(TaskException::General {
                    description: "boom".into(),
                }),
                500,
                "task_general_error",
            ),
            (
                Error::Task(TaskException::Url {
                    description: "bad scheme".into(),
                }),
                400,
                "task_url_error",
            ),
            (
                Error::Task(TaskException::HttpResponse {
                    status_code: 404,
                    description: "not found".into(),
                }),
                404,
                "task_http_response_error",
            ),
            (
                Error::Task(TaskException::HttpResponse {
                    status_code: 500,
                    description: "server error".into(),
                }),
                502,
                "task_http_response_error",
            ),
            (
                Error::Task(TaskException::Connection {
                    description: "reset".into(),
                }),
                502,
                "task_connection_error",
            ),
            (
                Error::Task(TaskException::FileSystem {
                    description: "disk full".into(),
                }),
                500,
                "task_file_system_error",
            ),
            (
                Error::Task(TaskException::Resume {
                    description: "etag mismatch".into(),
                }),
                409,
                "task_resume_error",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            let actual_status = error.status_code();
            assert_eq!(
                actual_status, expected_status,
                "Error variant with error_code={expected_code} returned status {actual_status}, expected {expected_status}"
            );
        }
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            let actual_code = error.error_code();
            assert_eq!(
                actual_code, expected_code,
                "Error variant with expected status={expected_status} returned error_code={actual_code}, expected {expected_code}"
            );
        }
    }

    #[test]
    fn config_error_is_400_not_500() {
        let err = Error::Config {
            message: "bad".into(),
            key: None,
        };
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn shutting_down_is_503() {
        assert_eq!(Error::ShuttingDown.status_code(), 503);
    }

    #[test]
    fn not_supported_is_501() {
        let err = Error::NotSupported("feature X".into());
        assert_eq!(err.status_code(), 501);
    }

    #[test]
    fn api_error_from_invalid_state_has_id_and_operation() {
        let err = Error::InvalidState {
            id: "task-1".into(),
            operation: "resume".into(),
            current_state: "completed".into(),
        };
        let api: ApiError = err.into();

        assert_eq!(api.error.code, "invalid_state");
        let details = api.error.details.expect("should have details");
        assert_eq!(details["task_id"], "task-1");
        assert_eq!(details["operation"], "resume");
        assert_eq!(details["current_state"], "completed");
    }

    #[test]
    fn api_error_from_task_http_response_has_status_code() {
        let err = Error::Task(TaskException::HttpResponse {
            status_code: 403,
            description: "forbidden".into(),
        });
        let api: ApiError = err.into();

        assert_eq!(api.error.code, "task_http_response_error");
        let details = api.error.details.expect("should have details");
        assert_eq!(details["status_code"], 403);
    }

    #[test]
    fn api_error_from_io_has_no_details() {
        let err = Error::Io(std::io::Error::other("disk fail"));
        let api: ApiError = err.into();

        assert_eq!(api.error.code, "io_error");
        assert!(
            api.error.details.is_none(),
            "Io errors should not have structured details"
        );
    }

    #[test]
    fn api_error_from_shutting_down_has_no_details() {
        let api: ApiError = Error::ShuttingDown.into();

        assert_eq!(api.error.code, "shutting_down");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn api_error_from_not_found_string_has_no_details() {
        let err = Error::NotFound("task abc".into());
        let api: ApiError = err.into();

        assert_eq!(api.error.code, "not_found");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn api_error_not_found_factory() {
        let api = ApiError::not_found("Task abc123");

        assert_eq!(api.error.code, "not_found");
        assert_eq!(api.error.message, "Task abc123 not found");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn api_error_validation_factory() {
        let api = ApiError::validation("url is required");

        assert_eq!(api.error.code, "validation_error");
        assert_eq!(api.error.message, "url is required");
        assert!(api.error.details.is_none());
    }

    #[test]
    fn api_error_conflict_factory() {
        let api = ApiError::conflict("task already exists");

        assert_eq!(api.error.code, "conflict");
        assert_eq!(api.error.message, "task already exists");
    }

    #[test]
    fn api_error_internal_factory() {
        let api = ApiError::internal("unexpected failure");

        assert_eq!(api.error.code, "internal_error");
        assert_eq!(api.error.message, "unexpected failure");
    }

    #[test]
    fn api_error_unauthorized_factory() {
        let api = ApiError::unauthorized("invalid token");

        assert_eq!(api.error.code, "unauthorized");
        assert_eq!(api.error.message, "invalid token");
    }

    #[test]
    fn api_error_service_unavailable_factory() {
        let api = ApiError::service_unavailable("engine overloaded");

        assert_eq!(api.error.code, "service_unavailable");
        assert_eq!(api.error.message, "engine overloaded");
    }

    #[test]
    fn with_details_preserves_json_object() {
        let details = serde_json::json!({
            "task_id": "abc",
            "retries": 3,
        });
        let api = ApiError::with_details("custom_error", "something broke", details.clone());

        assert_eq!(api.error.code, "custom_error");
        let actual_details = api.error.details.expect("details should be present");
        assert_eq!(actual_details, details);
    }

    #[test]
    fn api_error_without_details_omits_details_in_json() {
        let api = ApiError::new("test_code", "test message");

        let json_str = serde_json::to_string(&api).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json_str).unwrap();

        assert_eq!(parsed["error"]["code"], "test_code");
        assert!(parsed["error"].get("details").is_none());
    }

    #[test]
    fn api_error_round_trips_through_json() {
        let original = ApiError::with_details(
            "not_found",
            "Task abc not found",
            serde_json::json!({"task_id": "abc"}),
        );

        let json_str = serde_json::to_string(&original).unwrap();
        let deserialized: ApiError = serde_json::from_str(&json_str).unwrap();

        assert_eq!(deserialized.error.code, original.error.code);
        assert_eq!(deserialized.error.message, original.error.message);
        assert_eq!(deserialized.error.details, original.error.details);
    }

    #[test]
    fn api_error_message_matches_error_display() {
        let err = Error::InvalidState {
            id: "t5".into(),
            operation: "resume".into(),
            current_state: "completed".into(),
        };
        let display_msg = err.to_string();
        let api: ApiError = err.into();

        assert_eq!(api.error.message, display_msg);
    }
}
