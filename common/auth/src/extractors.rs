use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::verifier::TokenVerifier;

/// Header older clients send the raw access token in.
const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Extracts verified access-token claims from the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.claims.has_role(role)
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);

        let token = extract_token(&parts.headers)?;
        let claims = verifier.verify(&token)?;

        Ok(Self { claims, token })
    }
}

/// Accepts both header conventions: `x-access-token` with the bare token,
/// and `authorization` with or without a `Bearer ` scheme.
pub fn extract_token(headers: &HeaderMap) -> AuthResult<String> {
    let header_value = headers
        .get(ACCESS_TOKEN_HEADER)
        .or_else(|| headers.get(AUTHORIZATION))
        .ok_or(AuthError::MissingToken)?;

    parse_token(header_value)
}

fn parse_token(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = match raw.strip_prefix("Bearer") {
        Some(rest) => rest.trim(),
        None => raw,
    };

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
