use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token missing")]
    MissingToken,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // A missing token is the only 401 here; a token that is present but
        // fails verification is answered with 400 "Invalid Token", matching
        // the contract existing clients depend on.
        let (status, code) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "AUTH_MISSING"),
            AuthError::InvalidAuthorization
            | AuthError::Verification(_)
            | AuthError::InvalidClaim(_, _)
            | AuthError::InvalidJson(_) => (StatusCode::BAD_REQUEST, "AUTH_TOKEN"),
        };

        let message = match &self {
            AuthError::MissingToken => self.to_string(),
            _ => "Invalid Token".to_string(),
        };

        let body = ErrorBody { code, message };
        (status, Json(body)).into_response()
    }
}
