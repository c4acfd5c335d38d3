use anyhow::{Context, Result};
use std::env;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;

/// Process configuration, loaded once at startup and injected into the
/// application state. Nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub token_issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
}

pub fn load_config() -> Result<ServiceConfig> {
    let database_url = required_env("DATABASE_URL")?;
    let access_token_secret = required_env("ACCESS_TOKEN_SECRET")?;
    let refresh_token_secret = required_env("REFRESH_TOKEN_SECRET")?;

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT")
        .ok()
        .map(|value| value.parse::<u16>())
        .transpose()
        .context("Failed to parse PORT")?
        .unwrap_or(8080);

    let token_issuer =
        env::var("TOKEN_ISSUER").unwrap_or_else(|_| "identity-service".to_string());

    let access_ttl_seconds = seconds_from_env("ACCESS_TOKEN_TTL_SECS")?
        .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS);
    let refresh_ttl_seconds = seconds_from_env("REFRESH_TOKEN_TTL_SECS")?
        .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS);

    let sweep_interval_seconds = env::var("TOKEN_SWEEP_INTERVAL_SECS")
        .ok()
        .map(|value| value.parse::<u64>())
        .transpose()
        .context("Failed to parse TOKEN_SWEEP_INTERVAL_SECS")?
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

    Ok(ServiceConfig {
        database_url,
        host,
        port,
        access_token_secret,
        refresh_token_secret,
        token_issuer,
        access_ttl_seconds,
        refresh_ttl_seconds,
        sweep_interval_seconds,
    })
}

fn required_env(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| format!("{key} must be set"))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        anyhow::bail!("{key} must not be empty");
    }
    Ok(trimmed.to_string())
}

fn seconds_from_env(key: &str) -> Result<Option<i64>> {
    env::var(key)
        .ok()
        .map(|value| {
            value
                .parse::<i64>()
                .with_context(|| format!("Failed to parse {key}"))
        })
        .transpose()
}
