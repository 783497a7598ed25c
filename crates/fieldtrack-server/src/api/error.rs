//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fieldtrack_core::{FieldtrackError, PERMISSION_RATIONALE};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 403 Forbidden - Location access has not been granted.
    Forbidden {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Whether the user asked not to be prompted again.
        permanent: bool,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed due to current state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 422 Unprocessable Entity - Well-formed input that cannot be used.
    Unprocessable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<serde_json::Value>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 503 Service Unavailable - The position source cannot answer.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Whether retrying later may succeed.
        retryable: bool,
    },

    /// 504 Gateway Timeout - The position source did not answer in time.
    Timeout {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "INVALID_TARGET",
    "message": "Invalid target: radius must be a positive number of meters",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "PERMISSION_DENIED").
    #[schema(example = "INVALID_TARGET")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Invalid target: radius must be a positive number of meters")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// A 400 error with the given code and message.
    pub fn bad_request(error_code: &str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// A 409 error with the given code and message.
    pub fn conflict(error_code: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// The HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_response = match self {
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::NotFound {
                error_code,
                message,
            }
            | Self::Conflict {
                error_code,
                message,
            }
            | Self::Timeout {
                error_code,
                message,
            } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::Forbidden {
                error_code,
                message,
                permanent,
            } => ErrorResponse {
                error: error_code,
                message,
                details: Some(serde_json::json!({
                    "permanent": permanent,
                    "rationale": PERMISSION_RATIONALE
                })),
            },

            Self::Unprocessable {
                error_code,
                message,
                details,
            } => ErrorResponse {
                error: error_code,
                message,
                details,
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                // Log internal errors
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                }
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                retryable,
            } => ErrorResponse {
                error: error_code,
                message,
                details: Some(serde_json::json!({ "retryable": retryable })),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Forbidden { message, .. } => write!(f, "Forbidden: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::Unprocessable { message, .. } => write!(f, "Unprocessable: {message}"),
            Self::InternalError { message, .. } => {
                write!(f, "Internal Error: {message}")
            }
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
            Self::Timeout { message, .. } => write!(f, "Timeout: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from fieldtrack_core errors.
impl From<FieldtrackError> for ApiError {
    fn from(err: FieldtrackError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match &err {
            FieldtrackError::PermissionDenied { permanent } => Self::Forbidden {
                error_code,
                message,
                permanent: *permanent,
            },
            FieldtrackError::PermissionRestricted => Self::Forbidden {
                error_code,
                message,
                permanent: true,
            },
            FieldtrackError::InvalidTarget(_) | FieldtrackError::InvalidPosition(_) => {
                Self::BadRequest {
                    error_code,
                    message,
                }
            }
            FieldtrackError::TargetNotFound(_) => Self::NotFound {
                error_code,
                message,
            },
            FieldtrackError::AlreadyTracking => Self::Conflict {
                error_code,
                message,
            },
            FieldtrackError::AccuracyTooLow {
                accuracy_meters,
                threshold_meters,
            } => Self::Unprocessable {
                details: Some(serde_json::json!({
                    "accuracy_meters": accuracy_meters,
                    "threshold_meters": threshold_meters
                })),
                error_code,
                message,
            },
            FieldtrackError::ConfigValidationError(_) | FieldtrackError::ConfigParseError(_) => {
                Self::Unprocessable {
                    error_code,
                    message,
                    details: None,
                }
            }
            FieldtrackError::PositionUnavailable(_) => Self::ServiceUnavailable {
                error_code,
                message,
                retryable: err.is_recoverable(),
            },
            FieldtrackError::Timeout(_) => Self::Timeout {
                error_code,
                message,
            },
            FieldtrackError::ConfigNotFound(_)
            | FieldtrackError::Unknown(_)
            | FieldtrackError::IoError(_) => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<fieldtrack_core::ConfigError> for ApiError {
    fn from(err: fieldtrack_core::ConfigError) -> Self {
        Self::from(FieldtrackError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::bad_request("test_error", "Test message");
        assert!(err.to_string().contains("Bad Request"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_core_error_status_matches_core_classification() {
        let cases = [
            FieldtrackError::PermissionDenied { permanent: false },
            FieldtrackError::PermissionRestricted,
            FieldtrackError::PositionUnavailable("no fix".into()),
            FieldtrackError::Timeout("15000 ms".into()),
            FieldtrackError::AccuracyTooLow {
                accuracy_meters: 80.0,
                threshold_meters: 50.0,
            },
            FieldtrackError::AlreadyTracking,
            FieldtrackError::InvalidTarget("radius".into()),
            FieldtrackError::TargetNotFound("wo-1".into()),
            FieldtrackError::ConfigValidationError("monitor.timeout_ms".into()),
            FieldtrackError::Unknown("boom".into()),
        ];

        for err in cases {
            let expected = err.http_status_code();
            let api = ApiError::from(err);
            assert_eq!(api.status().as_u16(), expected, "{api}");
        }
    }

    #[test]
    fn test_permission_error_carries_rationale() {
        let response =
            ApiError::from(FieldtrackError::PermissionDenied { permanent: true }).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
