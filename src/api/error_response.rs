//! HTTP error response handling for the API
//!
//! This module provides conversions from domain errors to HTTP responses
//! with appropriate status codes and JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Implement IntoResponse for Error to automatically convert errors to HTTP responses
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Implement IntoResponse for ApiError for explicit error responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Default to 500 if we're directly converting an ApiError
        // (usually errors go through Error::into_response which has the status code)
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;

    #[test]
    fn test_error_to_http_status_not_found() {
        let error = Error::NotFound("test".to_string());
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), "not_found");
    }

    #[test]
    fn test_error_to_http_status_invalid_state() {
        let error = Error::InvalidState {
            id: "t1".to_string(),
            operation: "resume".to_string(),
            current_state: "completed".to_string(),
        };
        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), "invalid_state");
    }

    #[test]
    fn test_error_to_http_status_service_unavailable() {
        let error = Error::ShuttingDown;
        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), "shutting_down");
    }

    #[test]
    fn test_error_to_http_status_internal_server() {
        let error = Error::Database(DatabaseError::QueryFailed("query failed".to_string()));
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "database_error");
    }

    #[test]
    fn test_error_to_api_error_with_details() {
        let error = Error::InvalidState {
            id: "t1".to_string(),
            operation: "resume".to_string(),
            current_state: "completed".to_string(),
        };
        let api_error: ApiError = error.into();

        assert_eq!(api_error.error.code, "invalid_state");
        assert!(api_error.error.details.is_some());

        let details = api_error.error.details.unwrap();
        assert_eq!(details["task_id"], "t1");
        assert_eq!(details["operation"], "resume");
    }

    #[tokio::test]
    async fn test_error_into_response() {
        let error = Error::NotFound("test resource".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();

        assert_eq!(api_error.error.code, "not_found");
        assert!(api_error.error.message.contains("test resource"));
    }

    #[tokio::test]
    async fn test_invalid_state_error_into_response() {
        let error = Error::InvalidState {
            id: "t2".to_string(),
            operation: "pause".to_string(),
            current_state: "paused".to_string(),
        };
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();

        assert_eq!(api_error.error.code, "invalid_state");
        assert_eq!(api_error.error.details.as_ref().unwrap()["task_id"], "t2");
        assert_eq!(
            api_error.error.details.as_ref().unwrap()["operation"],
            "pause"
        );
    }
}
