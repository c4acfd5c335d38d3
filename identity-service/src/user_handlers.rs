use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use common_auth::{ensure_role, AuthContext, Claims, ROLE_ADMIN};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::store::{self, UserRecord};
use crate::tokens::{IssuedCredentials, PublicUser};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ValidateRoleRequest {
    pub role: String,
}

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub role: String,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Credential check, then a fresh token pair.
pub async fn login_user(
    State(state): State<AppState>,
    Json(login): Json<LoginRequest>,
) -> ServiceResult<Json<IssuedCredentials>> {
    let LoginRequest { email, password } = login;

    let user = match store::find_user_by_email(&state.db, &email).await? {
        Some(user) => user,
        None => {
            state.metrics.login_attempt("unknown_user");
            return Err(ServiceError::UserNotFound);
        }
    };

    if !verify_password(&user.password_hash, &password) {
        state.metrics.login_attempt("invalid_password");
        warn!(user_id = %user.id, "login rejected: password mismatch");
        return Err(ServiceError::InvalidCredentials);
    }

    let issued = state.token_issuer.issue_credentials(&user).await?;
    state.metrics.login_attempt("success");
    Ok(Json(issued))
}

/// Creates the account and immediately issues its first token pair. Email
/// uniqueness is enforced only by the store's unique index.
pub async fn register_user(
    State(state): State<AppState>,
    Json(register): Json<RegisterRequest>,
) -> ServiceResult<Json<IssuedCredentials>> {
    let RegisterRequest {
        email,
        password,
        role,
        firstname,
        lastname,
    } = register;

    let password_hash = hash_password(&password)?;
    let user = UserRecord {
        id: Uuid::new_v4(),
        email,
        password_hash,
        role,
        first_name: firstname,
        last_name: lastname,
    };

    store::insert_user(&state.db, &user).await?;
    info!(user_id = %user.id, "registered user");

    let issued = state.token_issuer.issue_credentials(&user).await?;
    Ok(Json(issued))
}

/// Deletes every token record bound to the presented refresh token. The
/// deletion is awaited, so invalidation has happened by the time the
/// response is sent. Idempotent: an unknown token is still a success.
pub async fn logout_user(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> ServiceResult<Json<SuccessResponse>> {
    let deleted = store::delete_token_records_by_refresh(&state.db, &body.refresh_token).await?;
    info!(deleted, "logout");
    Ok(SuccessResponse::ok())
}

/// Single-use refresh: the presented token is rotated away before a new
/// pair is issued, so a replay fails as an invalid token.
pub async fn refresh_session(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(body): Json<RefreshTokenRequest>,
) -> ServiceResult<Json<IssuedCredentials>> {
    match state.token_issuer.refresh(&body.refresh_token).await {
        Ok(issued) => {
            state.metrics.token_refresh("success");
            Ok(Json(issued))
        }
        Err(err) => {
            state.metrics.token_refresh(match err {
                ServiceError::InvalidToken => "invalid_token",
                ServiceError::UserNotFound => "unknown_user",
                _ => "error",
            });
            Err(err)
        }
    }
}

/// The user snapshot embedded in the token record at issuance. Role
/// validation reads this snapshot, not the live user row.
#[derive(Serialize)]
pub struct ValidatedUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

pub async fn validate_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<ValidateRoleRequest>,
) -> ServiceResult<Json<ValidatedUser>> {
    ensure_role(&auth, &[ROLE_ADMIN])?;

    let record = state.token_issuer.resolve_token_record(&auth.token).await?;

    if record.user_role != body.role {
        return Err(ServiceError::InvalidRole {
            required: body.role,
        });
    }

    Ok(Json(ValidatedUser {
        id: record.user_id,
        email: record.user_email,
        role: record.user_role,
    }))
}

/// Re-hashes and persists the new password. Outstanding token pairs stay
/// valid until they expire; only a new login picks up the change.
pub async fn update_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<UpdatePasswordRequest>,
) -> ServiceResult<Json<SuccessResponse>> {
    let user = state.token_issuer.resolve_user(&auth.token).await?;

    let password_hash = hash_password(&body.password)?;
    store::update_password_hash(&state.db, user.id, &password_hash).await?;
    info!(user_id = %user.id, "password updated");

    Ok(SuccessResponse::ok())
}

/// Overwrites email, role and names with the patch values unconditionally.
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(patch): Json<UpdateUserRequest>,
) -> ServiceResult<Json<SuccessResponse>> {
    ensure_role(&auth, &[ROLE_ADMIN])?;

    let user = state.token_issuer.resolve_user(&auth.token).await?;

    store::update_user_profile(
        &state.db,
        user.id,
        &patch.email,
        &patch.role,
        &patch.firstname,
        &patch.lastname,
    )
    .await?;
    info!(user_id = %user.id, "profile updated");

    Ok(SuccessResponse::ok())
}

/// Removes the user row. Token records are left to age out; resolving one
/// of them afterwards fails with a user-not-found error.
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ServiceResult<Json<SuccessResponse>> {
    ensure_role(&auth, &[ROLE_ADMIN])?;

    let user = state.token_issuer.resolve_user(&auth.token).await?;

    store::delete_user(&state.db, user.id).await?;
    info!(user_id = %user.id, "user deleted");

    Ok(SuccessResponse::ok())
}

/// Signature and expiry check of an arbitrary access token from the body.
pub async fn verify_token(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(body): Json<VerifyTokenRequest>,
) -> ServiceResult<Json<Claims>> {
    let claims = state
        .access_verifier
        .verify(&body.token)
        .map_err(|_| ServiceError::InvalidToken)?;

    Ok(Json(claims))
}

/// Same contract as `verify_token`, against the refresh-token secret.
pub async fn verify_refresh_token(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(body): Json<RefreshTokenRequest>,
) -> ServiceResult<Json<Claims>> {
    let claims = state.token_issuer.verify_refresh(&body.refresh_token)?;
    Ok(Json(claims))
}

/// Resolves the bearer token to its live user. Unlike pure signature
/// checks this consults the store, so rotated-away tokens fail here.
pub async fn verify_user(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ServiceResult<Json<PublicUser>> {
    let user = state.token_issuer.resolve_user(&auth.token).await?;
    Ok(Json(PublicUser::from(&user)))
}

fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::Hash(err.to_string()))
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed_hash) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok(),
        Err(_) => false,
    }
}
