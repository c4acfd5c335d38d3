use chrono::{DateTime, Duration, SecondsFormat, Utc};
use common_auth::{Claims, TokenVerifier, VerifierConfig};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::store::{self, TokenRecord, UserRecord};

pub struct TokenConfig {
    pub issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

/// Issues, rotates and resolves access/refresh token pairs. Both tokens
/// are HS256 JWTs, signed with two distinct secrets.
pub struct TokenIssuer {
    pool: PgPool,
    config: TokenConfig,
    access_key: EncodingKey,
    refresh_key: EncodingKey,
    refresh_verifier: TokenVerifier,
}

/// Redacted user view returned with every credential payload. Never
/// carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub firstname: String,
    pub lastname: String,
}

impl From<&UserRecord> for PublicUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            firstname: user.first_name.clone(),
            lastname: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: String,
    pub refresh_token_expires_at: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
    pub user: PublicUser,
}

#[derive(Serialize)]
struct SignedClaims<'a> {
    sub: String,
    email: &'a str,
    role: &'a str,
    iss: &'a str,
    exp: i64,
    iat: i64,
    // Distinguishes pairs issued within the same second.
    jti: String,
}

impl TokenIssuer {
    pub fn new(
        pool: PgPool,
        config: TokenConfig,
        access_secret: &str,
        refresh_secret: &str,
    ) -> Self {
        let refresh_verifier = TokenVerifier::new(
            VerifierConfig::new(config.issuer.clone()),
            refresh_secret,
        );

        Self {
            pool,
            config,
            access_key: EncodingKey::from_secret(access_secret.as_bytes()),
            refresh_key: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_verifier,
        }
    }

    /// Signs a fresh pair, persists the token record, and returns the
    /// tokens with a redacted user view. Every successful login,
    /// registration and refresh lands here.
    pub async fn issue_credentials(&self, user: &UserRecord) -> ServiceResult<IssuedCredentials> {
        let now = Utc::now();
        let access_expires_at = now + Duration::seconds(self.config.access_ttl_seconds);
        let refresh_expires_at = now + Duration::seconds(self.config.refresh_ttl_seconds);

        let access_token = sign_claims(user, &self.config.issuer, now, access_expires_at, &self.access_key)?;
        let refresh_token =
            sign_claims(user, &self.config.issuer, now, refresh_expires_at, &self.refresh_key)?;

        let record = TokenRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_email: user.email.clone(),
            user_role: user.role.clone(),
            access_token: access_token.clone(),
            access_expires_at,
            refresh_token: refresh_token.clone(),
            refresh_expires_at,
        };
        store::insert_token_record(&self.pool, &record).await?;

        Ok(IssuedCredentials {
            access_token,
            refresh_token,
            access_token_expires_at: access_expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            refresh_token_expires_at: refresh_expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            expires_in: self.config.access_ttl_seconds,
            refresh_expires_in: self.config.refresh_ttl_seconds,
            token_type: "Bearer",
            user: PublicUser::from(user),
        })
    }

    /// Rotates a refresh token: verifies it, hard-deletes every record it
    /// matches, then issues a new pair for the owning user. The deletion
    /// is awaited before anything is returned, so a consumed refresh
    /// token is guaranteed invalid by the time the caller sees the
    /// response. A token that matched no live record has already been
    /// consumed (or logged out, or expired) and is rejected even while
    /// its signature still checks out.
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<IssuedCredentials> {
        let claims = self.verify_refresh(refresh_token)?;

        let rotated = store::delete_token_records_by_refresh(&self.pool, refresh_token).await?;
        if rotated == 0 {
            return Err(ServiceError::InvalidToken);
        }
        debug!(subject = %claims.subject, rotated, "rotated refresh token");

        let user = store::find_user_by_id(&self.pool, claims.subject)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        self.issue_credentials(&user).await
    }

    /// Signature and expiry check against the refresh secret.
    pub fn verify_refresh(&self, token: &str) -> ServiceResult<Claims> {
        self.refresh_verifier
            .verify(token)
            .map_err(|_| ServiceError::InvalidToken)
    }

    /// Resolves the token record backing an access token. Store presence
    /// is the authority here: a rotated-away token fails even while its
    /// signature is still valid.
    pub async fn resolve_token_record(&self, access_token: &str) -> ServiceResult<TokenRecord> {
        store::find_token_record_by_access(&self.pool, access_token)
            .await?
            .ok_or(ServiceError::InvalidToken)
    }

    /// Resolves an access token to its live user row: record lookup, then
    /// a user lookup by the record's owner. The second step catches users
    /// deleted after issuance.
    pub async fn resolve_user(&self, access_token: &str) -> ServiceResult<UserRecord> {
        let record = self.resolve_token_record(access_token).await?;

        store::find_user_by_id(&self.pool, record.user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }
}

fn sign_claims(
    user: &UserRecord,
    issuer: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    key: &EncodingKey,
) -> ServiceResult<String> {
    let claims = SignedClaims {
        sub: user.id.to_string(),
        email: &user.email,
        role: &user.role,
        iss: issuer,
        exp: expires_at.timestamp(),
        iat: issued_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(&Header::default(), &claims, key).map_err(|err| ServiceError::Token(err.to_string()))
}
