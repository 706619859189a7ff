//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use engagement_core::EngagementError;
use tracing::{error, warn};

use crate::config::ConfigError;
use crate::web::protocol::ErrorBody;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the engagement engine.
    #[error(transparent)]
    Engine(#[from] EngagementError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was well-formed HTTP but its content was not acceptable.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Login rejected")]
    InvalidCredentials,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Engine(err) => match err {
                EngagementError::Validation(_) | EngagementError::MalformedDuration(_) => {
                    StatusCode::BAD_REQUEST
                }
                EngagementError::NotFound(_) => StatusCode::NOT_FOUND,
                EngagementError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngagementError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message safe to show a caller. Server-side failures are reduced to
    /// a generic line; their detail goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Unauthorized => "Missing or invalid operator token".to_string(),
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::Engine(EngagementError::Validation(msg)) => msg.clone(),
            Self::Engine(EngagementError::NotFound(msg)) => msg.clone(),
            Self::Engine(err @ EngagementError::MalformedDuration(_)) => err.to_string(),
            Self::Engine(EngagementError::StorageUnavailable(_)) => {
                "Storage is temporarily unavailable, please retry".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let retryable = matches!(&self, Self::Engine(err) if err.is_retryable());
        let body = ErrorBody {
            success: false,
            message: self.public_message(),
            retryable: retryable.then_some(true),
        };
        (status, Json(body)).into_response()
    }
}
