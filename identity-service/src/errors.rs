use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::GuardError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure taxonomy for the auth operations. Each variant maps to a fixed
/// status code instead of the blanket 500 the legacy service answered with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user not found")]
    UserNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid role: expected '{required}'")]
    InvalidRole { required: String },
    #[error("insufficient role. Required one of: {0}")]
    Forbidden(String),
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("failed to sign token: {0}")]
    Token(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<GuardError> for ServiceError {
    fn from(value: GuardError) -> Self {
        let GuardError::Forbidden { required } = value;
        Self::Forbidden(required.join(", "))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServiceError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            ServiceError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
            }
            ServiceError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            ServiceError::InvalidRole { .. } => (StatusCode::FORBIDDEN, "INVALID_ROLE"),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ServiceError::DuplicateEmail(_) => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
            ServiceError::Hash(_) | ServiceError::Token(_) | ServiceError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR")
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
