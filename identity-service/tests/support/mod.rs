use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHasher};
use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, Response};
use axum::Router;
use common_auth::{TokenVerifier, VerifierConfig};
use dirs::cache_dir;
use identity_service::app::router;
use identity_service::config::ServiceConfig;
use identity_service::metrics::AuthMetrics;
use identity_service::tokens::{TokenConfig, TokenIssuer};
use identity_service::AppState;
use pg_embed::pg_enums::PgAuthMethod;
use pg_embed::pg_fetch::{PgFetchSettings, PG_V13};
use pg_embed::postgres::{PgEmbed, PgSettings};
use portpicker::pick_unused_port;
use rand_core::OsRng;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_ACCESS_SECRET: &str = "test-access-secret";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret";
pub const TEST_ISSUER: &str = "identity-service";

pub struct TestDatabase {
    pool: PgPool,
    embedded: Option<EmbeddedPg>,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        if env::var("IDENTITY_TEST_DATABASE_URL").is_err()
            && !env_flag_enabled("IDENTITY_TEST_USE_EMBED")
        {
            eprintln!(
                "Skipping identity-service integration tests: set IDENTITY_TEST_DATABASE_URL or IDENTITY_TEST_USE_EMBED=1 to run them.",
            );
            return Ok(None);
        }

        let mut embedded = None;
        let database_url = if let Ok(url) = env::var("IDENTITY_TEST_DATABASE_URL") {
            url
        } else {
            if env_flag_enabled("IDENTITY_TEST_EMBED_CLEAR_CACHE") {
                if let Some(cache_dir) = cache_dir() {
                    let _ = std::fs::remove_dir_all(cache_dir.join("pg-embed"));
                }
            }

            let temp = tempdir()?;
            let port = pick_unused_port()
                .context("failed to find available port for embedded Postgres")?;

            let mut fetch_settings = PgFetchSettings::default();
            fetch_settings.version = PG_V13;

            let mut pg = PgEmbed::new(
                PgSettings {
                    database_dir: temp.path().to_path_buf(),
                    port,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    auth_method: PgAuthMethod::Plain,
                    persistent: false,
                    timeout: Some(Duration::from_secs(30)),
                    migration_dir: None,
                },
                fetch_settings,
            )
            .await?;

            pg.setup().await?;
            pg.start_db().await?;

            let uri = format!("{}/postgres", pg.db_uri);
            embedded = Some(EmbeddedPg {
                pg,
                _temp_dir: temp,
            });
            uri
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        if embedded.is_some() || env_flag_enabled("IDENTITY_TEST_APPLY_MIGRATIONS") {
            run_migrations(&pool).await?;
        }

        Ok(Some(Self { pool, embedded }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn teardown(self) -> Result<()> {
        if let Some(embedded) = self.embedded {
            embedded.shutdown().await;
        }
        Ok(())
    }
}

struct EmbeddedPg {
    pg: PgEmbed,
    _temp_dir: TempDir,
}

impl EmbeddedPg {
    async fn shutdown(mut self) {
        let _ = self.pg.stop_db().await;
    }
}

fn env_flag_enabled(key: &str) -> bool {
    matches!(env::var(key), Ok(value) if is_truthy(value.as_str()))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut entries = std::fs::read_dir(&migrations_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let sql = std::fs::read_to_string(&path)?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SeededUser {
    pub user_id: Uuid,
    pub email: String,
    pub password: String,
}

#[allow(dead_code)]
pub async fn seed_test_user(pool: &PgPool, role: &str) -> Result<SeededUser> {
    let user_id = Uuid::new_v4();
    let email = format!("{user_id}@example.com");
    let password = "CorrectHorseBatteryStaple!".to_string();
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, first_name, last_name) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(role)
    .bind("Test")
    .bind("User")
    .execute(pool)
    .await?;

    Ok(SeededUser {
        user_id,
        email,
        password,
    })
}

/// State and router wired the way `main` does it, with short TTLs and
/// fixed test secrets.
pub fn bootstrap_app(pool: PgPool) -> (AppState, Router) {
    let config = ServiceConfig {
        database_url: String::new(),
        host: "127.0.0.1".to_string(),
        port: 0,
        access_token_secret: TEST_ACCESS_SECRET.to_string(),
        refresh_token_secret: TEST_REFRESH_SECRET.to_string(),
        token_issuer: TEST_ISSUER.to_string(),
        access_ttl_seconds: 300,
        refresh_ttl_seconds: 900,
        sweep_interval_seconds: 3600,
    };

    let access_verifier = TokenVerifier::new(
        VerifierConfig::new(TEST_ISSUER),
        TEST_ACCESS_SECRET,
    );
    let token_issuer = TokenIssuer::new(
        pool.clone(),
        TokenConfig {
            issuer: TEST_ISSUER.to_string(),
            access_ttl_seconds: config.access_ttl_seconds,
            refresh_ttl_seconds: config.refresh_ttl_seconds,
        },
        TEST_ACCESS_SECRET,
        TEST_REFRESH_SECRET,
    );

    let state = AppState {
        db: pool,
        access_verifier: Arc::new(access_verifier),
        token_issuer: Arc::new(token_issuer),
        config: Arc::new(config),
        metrics: Arc::new(AuthMetrics::new().expect("metrics")),
    };

    let app = router(state.clone());
    (state, app)
}

#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<Response<Body>> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("x-access-token", token);
    }

    let request = match body {
        Some(value) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    Ok(response)
}

#[allow(dead_code)]
pub async fn read_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
