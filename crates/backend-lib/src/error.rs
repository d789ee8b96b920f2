// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use roomsync_common::Ack;
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not configured")]
    Unauthenticated,

    #[error("Unknown connection")]
    UnknownConnection,

    #[error("Room not found")]
    NotFound { room_id: String, platform: String },

    #[error("User does not have edit permissions")]
    Forbidden,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No active sockets found for the given user IDs")]
    NoActiveSockets,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The room actor stopped between lookup and delivery; callers retry.
    #[error("Room {0} is shutting down")]
    RoomClosed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(room_id: &str, platform: &str) -> Self {
        AppError::NotFound {
            room_id: room_id.to_string(),
            platform: platform.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::UnknownConnection => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } | AppError::NoActiveSockets => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidInput(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::RoomClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::UnknownConnection => "UNKNOWN_CONNECTION",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Forbidden => "FORBIDDEN",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NoActiveSockets => "NO_ACTIVE_SOCKETS",
            AppError::RateLimitExceeded => "RATE_LIMITED",
            AppError::RoomClosed(_) => "ROOM_CLOSED",
            AppError::Json(_) => "MALFORMED_MESSAGE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Failed acknowledgement for this error
    pub fn to_ack(&self) -> Ack {
        Ack::failed(self.error_code(), self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "ok": false,
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
