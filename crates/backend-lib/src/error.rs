// crates/backend-lib/src/error.rs

//! Central error types + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Typed rejection reasons for room coordination operations.
///
/// Every reason stays distinct all the way to the caller-facing layer
/// so tests can assert on the specific rejection, even though clients
/// see a single message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("A live room already holds this code")]
    DuplicateCode,

    #[error("Room is closed")]
    RoomClosed,

    #[error("Room is full")]
    RoomFull,

    #[error("Wrong password")]
    BadPassword,

    #[error("Caller is not the room owner")]
    NotOwner,

    #[error("The game has not started")]
    GameNotActive,

    #[error("No active round")]
    NoActiveRound,

    #[error("Word uses letters outside the round's consonants")]
    DisallowedLetters,

    #[error("Word is not in the dictionary")]
    WordUnknown,

    #[error("Word was already submitted this game")]
    AlreadySubmitted,

    #[error("Shared store unavailable")]
    Unavailable,
}

impl RoomError {
    /// Stable code surfaced on the wire and asserted in tests.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::DuplicateCode => "DUPLICATE_CODE",
            RoomError::RoomClosed => "ROOM_CLOSED",
            RoomError::RoomFull => "ROOM_FULL",
            RoomError::BadPassword => "BAD_PASSWORD",
            RoomError::NotOwner => "NOT_OWNER",
            RoomError::GameNotActive => "GAME_NOT_ACTIVE",
            RoomError::NoActiveRound => "NO_ACTIVE_ROUND",
            RoomError::DisallowedLetters => "DISALLOWED_LETTERS",
            RoomError::WordUnknown => "WORD_UNKNOWN",
            RoomError::AlreadySubmitted => "ALREADY_SUBMITTED",
            RoomError::Unavailable => "STORE_UNAVAILABLE",
        }
    }
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shared store unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Room(e) => match e {
                RoomError::RoomNotFound => StatusCode::NOT_FOUND,
                RoomError::DuplicateCode | RoomError::AlreadySubmitted => StatusCode::CONFLICT,
                RoomError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::FORBIDDEN,
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Room(e) => e.code(),
            AppError::Internal(_) => "INT_001",
            AppError::NotFound(_) => "NF_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::RateLimitExceeded => "RATE_001",
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Unavailable(_) => "STORE_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Room(e) => e.to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
            AppError::Io(_) => "Internal server error".to_string(),
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::RateLimitExceeded => {
                "Rate limit exceeded, please try again later".to_string()
            },
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
            AppError::Unavailable(_) => "Service temporarily unavailable".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Failed to send message".to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_room_error_codes_are_distinct() {
        let all = [
            RoomError::RoomNotFound,
            RoomError::DuplicateCode,
            RoomError::RoomClosed,
            RoomError::RoomFull,
            RoomError::BadPassword,
            RoomError::NotOwner,
            RoomError::GameNotActive,
            RoomError::NoActiveRound,
            RoomError::DisallowedLetters,
            RoomError::WordUnknown,
            RoomError::AlreadySubmitted,
            RoomError::Unavailable,
        ];
        let mut codes: Vec<_> = all.iter().map(RoomError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Room(RoomError::RoomNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Room(RoomError::AlreadySubmitted).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Room(RoomError::RoomFull).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Room(RoomError::BadPassword).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Unavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_into_response() {
        let error = AppError::Room(RoomError::RoomNotFound);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_from_impls() {
        let io_err = IoError::new(ErrorKind::PermissionDenied, "Permission denied");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));

        let room_err: AppError = RoomError::NotOwner.into();
        assert_eq!(room_err.error_code(), "NOT_OWNER");

        let string_err = "String error".to_string();
        let app_err: AppError = string_err.into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }
}
