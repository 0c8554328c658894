//! Error types for ShortHub services
//!
//! Provides a single error enum with:
//! - Distinct variants for each failure class of the workflow
//! - HTTP status code mapping
//! - Structured error responses
//! - Stable error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,
    UnsupportedMediaType,

    // Authentication errors (2xxx)
    Unauthenticated,
    ExpiredToken,
    AccountBlocked,

    // Authorization errors (3xxx)
    Forbidden,

    // Resource errors (4xxx)
    NotFound,

    // Workflow errors (5xxx)
    InvalidStateTransition,
    Conflict,
    StorageNotConnected,
    NoCandidateAvailable,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    ExternalDependencyError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    CryptoError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1002,
            ErrorCode::UnsupportedMediaType => 1003,

            ErrorCode::Unauthenticated => 2001,
            ErrorCode::ExpiredToken => 2002,
            ErrorCode::AccountBlocked => 2003,

            ErrorCode::Forbidden => 3001,

            ErrorCode::NotFound => 4001,

            ErrorCode::InvalidStateTransition => 5001,
            ErrorCode::Conflict => 5002,
            ErrorCode::StorageNotConnected => 5003,
            ErrorCode::NoCandidateAvailable => 5004,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::ExternalDependencyError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::CryptoError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {mime_type}")]
    UnsupportedMediaType { mime_type: String },

    // Authentication errors
    #[error("Unauthenticated: {message}")]
    Unauthenticated { message: String },

    #[error("Token expired")]
    ExpiredToken,

    #[error("Account is blocked")]
    AccountBlocked,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    // Workflow errors
    #[error("Invalid state transition for {resource_type} {id}: {from} -> {to}")]
    InvalidStateTransition {
        resource_type: String,
        id: String,
        from: String,
        to: String,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("External storage is not connected")]
    StorageNotConnected,

    #[error("No candidate available: {message}")]
    NoCandidateAvailable { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("External dependency {service} failed: {message}")]
    ExternalDependency { service: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Crypto error: {message}")]
    Crypto { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a missing entity
    pub fn not_found(resource_type: &str, id: impl ToString) -> Self {
        AppError::NotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a role or ownership violation
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for malformed input
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Shorthand for a failing provider call
    pub fn external(service: &str, message: impl ToString) -> Self {
        AppError::ExternalDependency {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AppError::Unauthenticated {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedMediaType { .. } => ErrorCode::UnsupportedMediaType,
            AppError::Unauthenticated { .. } => ErrorCode::Unauthenticated,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::AccountBlocked => ErrorCode::AccountBlocked,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::StorageNotConnected => ErrorCode::StorageNotConnected,
            AppError::NoCandidateAvailable { .. } => ErrorCode::NoCandidateAvailable,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::ExternalDependency { .. } => ErrorCode::ExternalDependencyError,
            AppError::HttpClient(_) => ErrorCode::ExternalDependencyError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Crypto { .. } => ErrorCode::CryptoError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::StorageNotConnected => {
                StatusCode::BAD_REQUEST
            }

            // 401 Unauthorized
            AppError::Unauthenticated { .. } | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } | AppError::AccountBlocked => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::InvalidStateTransition { .. } | AppError::Conflict { .. } => {
                StatusCode::CONFLICT
            }

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 415 Unsupported Media Type
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // 422 Unprocessable Entity
            AppError::NoCandidateAvailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Crypto { .. }
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::ExternalDependency { .. } | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            AppError::InvalidStateTransition { from, to, .. } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::not_found("work_item", "abc");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "itemIds and deadlines must have the same length".into(),
            field: Some("deadlines".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_workflow_errors_are_client_errors() {
        let transition = AppError::InvalidStateTransition {
            resource_type: "work_item".into(),
            id: "1".into(),
            from: "ASSIGNED".into(),
            to: "RETAINED".into(),
        };
        assert_eq!(transition.code().as_code(), 5001);
        assert_eq!(transition.status_code(), StatusCode::CONFLICT);

        let exhausted = AppError::NoCandidateAvailable {
            message: "channel exhausted".into(),
        };
        assert_eq!(exhausted.code(), ErrorCode::NoCandidateAvailable);
        assert!(exhausted.is_client_error());
    }

    #[test]
    fn test_external_dependency_is_bad_gateway() {
        let err = AppError::external("storage", "timeout");
        assert_eq!(err.code(), ErrorCode::ExternalDependencyError);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::InvalidStateTransition).unwrap();
        assert_eq!(json, "\"INVALID_STATE_TRANSITION\"");
    }
}
