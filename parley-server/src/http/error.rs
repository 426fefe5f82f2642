use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::problem::ProblemDetails;
use crate::{
    auth::session::SessionError,
    services::{
        friend_service::FriendServiceError, image_host::ImageHostError,
        message_service::MessageServiceError, user_service::UserServiceError,
    },
};

pub type AppResult<T> = Result<T, ApiError>;

/// API-level error carrying the HTTP status and a stable machine code.
/// Rendered as an RFC 7807 problem document.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_credentials", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            message,
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "invalid_state", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = self.details {
            problem = problem.with_details(details);
        }
        problem.into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal_server_error(value.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err
                .code()
                .unwrap_or_else(|| std::borrow::Cow::Borrowed("unknown"));
            // Storage internals are logged, not surfaced.
            tracing::error!(sqlstate = %code, message = %db_err.message(), "database error");
            return Self::internal_server_error("Internal server error");
        }

        tracing::error!(error = %err, "database error");
        Self::internal_server_error("Internal server error")
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials => Self::invalid_credentials("Invalid credentials."),
            SessionError::Database(db_err) => Self::from(db_err),
            SessionError::PasswordHash(message) | SessionError::TimeConversion(message) => {
                tracing::error!(error = %message, "session subsystem failure");
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Validation(message) => Self::validation(message),
            UserServiceError::Conflict(message) => Self::conflict(message),
            UserServiceError::InvalidCredentials => {
                Self::invalid_credentials("Invalid credentials.")
            }
            UserServiceError::ExternalAccount => {
                Self::invalid_credentials("Please sign in with Google.")
            }
            UserServiceError::ProviderMismatch => Self::conflict(
                "An account with this email already exists. Please sign in using your original method.",
            ),
            UserServiceError::MissingProviderEmail => {
                Self::upstream("Email not provided by the identity provider.")
            }
            UserServiceError::NotFound(message) => Self::not_found(message),
            UserServiceError::Upload(message) => {
                tracing::error!(error = %message, "image upload failed");
                Self::upstream("Image upload failed.")
            }
            UserServiceError::PasswordHash(message) => {
                tracing::error!(error = %message, "password hashing failed");
                Self::internal_server_error("Internal server error")
            }
            UserServiceError::Database(db_err) => Self::from(db_err),
        }
    }
}

impl From<FriendServiceError> for ApiError {
    fn from(err: FriendServiceError) -> Self {
        match err {
            FriendServiceError::MissingIdentifier => Self::validation(err.to_string()),
            FriendServiceError::NotFound => Self::not_found(err.to_string()),
            FriendServiceError::SelfRequest
            | FriendServiceError::AlreadyFriends
            | FriendServiceError::AlreadySent
            | FriendServiceError::AlreadyReceived
            | FriendServiceError::NoSuchRequest
            | FriendServiceError::NotFriends => Self::invalid_state(err.to_string()),
            FriendServiceError::Database(db_err) => Self::from(db_err),
        }
    }
}

impl From<MessageServiceError> for ApiError {
    fn from(err: MessageServiceError) -> Self {
        match err {
            MessageServiceError::NotFound => Self::not_found(err.to_string()),
            MessageServiceError::Validation(message) => Self::validation(message),
            MessageServiceError::Upload(message) => {
                tracing::error!(error = %message, "image upload failed");
                Self::upstream("Image upload failed.")
            }
            MessageServiceError::Database(db_err) => Self::from(db_err),
        }
    }
}

impl From<ImageHostError> for ApiError {
    fn from(err: ImageHostError) -> Self {
        tracing::error!(error = %err, "image upload failed");
        Self::upstream("Image upload failed.")
    }
}
