//! Credential store: user rows and issued token records.
//!
//! Token records carry their own expiry; every lookup filters expired rows
//! out and the sweeper in `main` deletes them, so record expiry stays a
//! store-side lifecycle that no request handler drives.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
}

/// A persisted access/refresh pair with a snapshot of the owning user at
/// issuance time. The snapshot is what role validation reads; user
/// existence is always re-checked against the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_role: String,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub async fn find_user_by_email(
    pool: &PgPool,
    email: &str,
) -> ServiceResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>(
        "SELECT id, email, password_hash, role, first_name, last_name FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> ServiceResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>(
        "SELECT id, email, password_hash, role, first_name, last_name FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn insert_user(pool: &PgPool, user: &UserRecord) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, first_name, last_name)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.role)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .execute(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ServiceError::DuplicateEmail(user.email.clone())
        } else {
            ServiceError::Database(err)
        }
    })?;

    Ok(())
}

pub async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> ServiceResult<()> {
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Overwrites the four mutable profile fields unconditionally; there is no
/// partial-merge behavior and role values are not re-validated here.
pub async fn update_user_profile(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    role: &str,
    first_name: &str,
    last_name: &str,
) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE users SET email = $1, role = $2, first_name = $3, last_name = $4, updated_at = NOW()
         WHERE id = $5",
    )
    .bind(email)
    .bind(role)
    .bind(first_name)
    .bind(last_name)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ServiceError::DuplicateEmail(email.to_string())
        } else {
            ServiceError::Database(err)
        }
    })?;

    Ok(())
}

/// Deletes the user row only. Token records are deliberately left behind
/// and age out through their own expiry; resolving one afterwards fails
/// the user lookup instead of returning a dangling reference.
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> ServiceResult<()> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_token_record(pool: &PgPool, record: &TokenRecord) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO token_records
           (id, user_id, user_email, user_role, access_token, access_expires_at, refresh_token, refresh_expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.user_email)
    .bind(&record.user_role)
    .bind(&record.access_token)
    .bind(record.access_expires_at)
    .bind(&record.refresh_token)
    .bind(record.refresh_expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_token_record_by_access(
    pool: &PgPool,
    access_token: &str,
) -> ServiceResult<Option<TokenRecord>> {
    let record = sqlx::query_as::<_, TokenRecord>(
        "SELECT id, user_id, user_email, user_role, access_token, access_expires_at, refresh_token, refresh_expires_at
         FROM token_records
         WHERE access_token = $1 AND refresh_expires_at > NOW()",
    )
    .bind(access_token)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Removes every live record bound to the presented refresh token. Used
/// both for logout and for rotation; the row count is the caller's signal
/// that the token actually backed a session. Expired rows are left to the
/// sweeper so a record past its expiry never counts as consumed here,
/// even while verification leeway would still accept its signature.
pub async fn delete_token_records_by_refresh(
    pool: &PgPool,
    refresh_token: &str,
) -> ServiceResult<u64> {
    let result = sqlx::query(
        "DELETE FROM token_records WHERE refresh_token = $1 AND refresh_expires_at > NOW()",
    )
    .bind(refresh_token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete_expired_token_records(pool: &PgPool) -> ServiceResult<u64> {
    let result = sqlx::query("DELETE FROM token_records WHERE refresh_expires_at <= NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
