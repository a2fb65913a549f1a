//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code string.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing, invalid or expired session tokens
/// - **Authorization Errors**: Authenticated but lacking the required role
/// - **Resource Errors**: Requested resources not found (or not visible to the caller)
/// - **Billing Errors**: Not enough credits for the requested action
/// - **Validation Errors**: Invalid request data
/// - **Upstream Errors**: AI provider, payment processor or auth provider failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session token is missing, invalid, expired or signed out.
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller is authenticated but lacks the role required for the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Requested resource does not exist or belongs to another organization.
    #[error("{0}")]
    NotFound(String),

    /// Request body or parameters are invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Wallet balance is lower than the cost of the requested action.
    ///
    /// Returns HTTP 402 Payment Required.
    #[error("Insufficient credits. Required: {required}, Available: {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// Request conflicts with existing state (e.g., duplicate user).
    #[error("{0}")]
    Conflict(String),

    /// A third-party service call failed.
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Any other server-side failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    /// HTTP status and stable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::InsufficientCredits { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_credits")
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// True when a database error is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "success": false,
///   "error": {
///     "code": "insufficient_credits",
///     "message": "Insufficient credits. Required: 20, Available: 5"
///   }
/// }
/// ```
///
/// Database, upstream and internal errors are logged and replaced by a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Upstream(e) => {
                tracing::error!(error = %e, "upstream service error");
                "An upstream service failed".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });

        if let AppError::InsufficientCredits {
            required,
            available,
        } = &self
        {
            error["details"] = json!({ "required": required, "available": available });
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::Unauthorized.status_and_code().0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::forbidden("Admin access required").status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::not_found("Draft").status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::invalid("projectId is required").status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientCredits {
                required: 20,
                available: 5
            }
            .status_and_code()
            .0,
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_credits_message_names_both_amounts() {
        let err = AppError::InsufficientCredits {
            required: 20,
            available: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits. Required: 20, Available: 5"
        );
    }

    #[test]
    fn not_found_helper_formats_resource_name() {
        assert_eq!(AppError::not_found("Keyword").to_string(), "Keyword not found");
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response = AppError::Internal("secret connection string".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "internal_error");
        assert!(!body.to_string().contains("secret"));
    }
}
