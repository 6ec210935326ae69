// ABOUTME: Unified application error type with HTTP status mapping
// ABOUTME: AppError and ErrorCode render as JSON error bodies through axum IntoResponse
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Error Handling
//!
//! Every fallible operation in the server returns [`AppResult`]. Storage
//! errors arrive as [`DatabaseError`] and are mapped here so that engine-level
//! policy rejections surface as permission denials rather than server faults.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tessera_core::models::IdentifierError;
use thiserror::Error;
use tracing::{debug, error};

use crate::database::DatabaseError;

/// Result alias used throughout the server
pub type AppResult<T> = Result<T, AppError>;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request payload or parameter failed validation
    InvalidInput,
    /// A required field or header was missing
    MissingRequiredField,
    /// No identity or tenant scope is established
    AuthRequired,
    /// Credentials were presented but rejected
    AuthInvalid,
    /// Caller lacks the permission for this operation
    PermissionDenied,
    /// Resource does not exist (or is not visible to the caller)
    ResourceNotFound,
    /// Resource conflicts with an existing one
    ResourceAlreadyExists,
    /// A concurrent write won; the operation may be retried
    Conflict,
    /// Storage engine failure
    DatabaseError,
    /// Configuration is invalid or incomplete
    ConfigError,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// HTTP status used when rendering this code
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidInput | Self::MissingRequiredField => StatusCode::BAD_REQUEST,
            Self::AuthRequired | Self::AuthInvalid => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::ResourceAlreadyExists | Self::Conflict => StatusCode::CONFLICT,
            Self::DatabaseError | Self::ConfigError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable string form of the code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::ResourceAlreadyExists => "RESOURCE_ALREADY_EXISTS",
            Self::Conflict => "CONFLICT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error carrying a code and a client-safe message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct AppError {
    /// Error classification
    pub code: ErrorCode,
    /// Human readable message returned to the client
    pub message: String,
}

impl AppError {
    /// Create an error with an explicit code
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid request input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required field or header missing
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("missing required field: {field}"),
        )
    }

    /// No tenant/user context is established
    #[must_use]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, message)
    }

    /// Credentials rejected
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Caller is not allowed to perform this operation
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Resource already exists
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, message)
    }

    /// Concurrent modification
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Storage failure
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration failure
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Unexpected internal failure
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::PolicyViolation { table } => Self::permission_denied(format!(
                "row-level policy rejected write to {table}"
            )),
            DatabaseError::UniqueViolation { table, key } => {
                Self::already_exists(format!("{table} with {key} already exists"))
            }
            DatabaseError::MissingContext => Self::auth_required("unauthenticated context"),
            DatabaseError::SerializationFailure { table } => Self::conflict(format!(
                "concurrent update to {table}, transaction rolled back"
            )),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<IdentifierError> for AppError {
    fn from(error: IdentifierError) -> Self {
        Self::invalid_input(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("serialization failure: {error}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            error!(code = %self.code, message = %self.message, "request failed");
        } else {
            debug!(code = %self.code, message = %self.message, "request rejected");
        }
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_violation_maps_to_forbidden() {
        let err: AppError = DatabaseError::PolicyViolation {
            table: "accounts".to_owned(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.http_status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_context_maps_to_unauthorized() {
        let err: AppError = DatabaseError::MissingContext.into();
        assert_eq!(err.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "unauthenticated context");
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err: AppError = DatabaseError::UniqueViolation {
            table: "accounts".to_owned(),
            key: "code".to_owned(),
        }
        .into();
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn serialization_failure_maps_to_retryable_conflict() {
        let err: AppError = DatabaseError::SerializationFailure {
            table: "accounts".to_owned(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
        assert_eq!(err.code.as_str(), "CONFLICT");
    }
}
