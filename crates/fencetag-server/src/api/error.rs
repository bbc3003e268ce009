//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; errors render as a JSON
//! [`ErrorResponse`] with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 401 Unauthorized - Credentials were rejected by the location service.
    Unauthorized {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed in the current lifecycle state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 424 Failed Dependency - Something the operation needs is not configured.
    FailedDependency {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - Tag store, scheduler or location service is down.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "LOCATION_SERVICE_NOT_RUNNING",
    "message": "Location service is not running. Start it with valid credentials first.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "LOCATION_SERVICE_NOT_RUNNING")]
    pub error: String,

    /// Human-readable error message.
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::FailedDependency { .. } => StatusCode::FAILED_DEPENDENCY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_response = match self {
            Self::Unauthorized { error_code, message }
            | Self::Conflict { error_code, message } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
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

            Self::FailedDependency {
                error_code,
                message,
                details,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => ErrorResponse {
                error: error_code,
                message,
                details: details.map(|d| serde_json::json!(d)),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { message, .. } => write!(f, "Unauthorized: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::FailedDependency { message, .. } => {
                write!(f, "Failed Dependency: {message}")
            }
            Self::InternalError { message, .. } => {
                write!(f, "Internal Error: {message}")
            }
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from fencetag_core errors, keeping the core's status code.
impl From<fencetag_core::FencetagError> for ApiError {
    fn from(err: fencetag_core::FencetagError) -> Self {
        use fencetag_core::FencetagError;

        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match err.http_status_code() {
            401 => Self::Unauthorized {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            424 => Self::FailedDependency {
                error_code,
                message,
                details: matches!(err, FencetagError::CredentialsMissing)
                    .then(|| "Add a [credentials] section to the configuration file".into()),
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<fencetag_core::StoreError> for ApiError {
    fn from(err: fencetag_core::StoreError) -> Self {
        Self::from(fencetag_core::FencetagError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use fencetag_core::{FencetagError, StoreError};

    use super::*;

    #[test]
    fn test_conflict_error_display() {
        let err = ApiError::Conflict {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Conflict"));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = [
            (FencetagError::LocationServiceNotRunning, StatusCode::CONFLICT),
            (
                FencetagError::LocationAuthenticationFailed("bad key".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (FencetagError::CredentialsMissing, StatusCode::FAILED_DEPENDENCY),
            (FencetagError::SchedulerUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                FencetagError::PersistenceError("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.http_status_code(), status.as_u16());
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_error_keeps_core_error_code() {
        let err = ApiError::from(StoreError::Unavailable {
            message: "offline".into(),
        });
        match err {
            ApiError::ServiceUnavailable { error_code, .. } => {
                assert_eq!(error_code, "TAG_STORE_UNAVAILABLE");
            }
            other => panic!("unexpected error: {other:?}"),
        }
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
}
