use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Application-focused representation of verified token claims.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Uuid,
    pub email: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issuer: String,
}

impl Claims {
    /// Convenience helper for role checks.
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    email: String,
    role: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let subject = Uuid::parse_str(&value.sub)
            .map_err(|_| AuthError::InvalidClaim("sub", value.sub.clone()))?;

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;

        let issued_at = match value.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| AuthError::InvalidClaim("iat", iat.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            subject,
            email: value.email,
            role: value.role,
            expires_at,
            issued_at,
            issuer: value.iss,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        Claims::try_from(repr)
    }
}
