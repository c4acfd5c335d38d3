use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, Method,
};
use common_auth::{TokenVerifier, VerifierConfig};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use identity_service::app::router;
use identity_service::config::{load_config, ServiceConfig};
use identity_service::metrics::AuthMetrics;
use identity_service::store;
use identity_service::tokens::{TokenConfig, TokenIssuer};
use identity_service::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = load_config()?;
    let db_pool = PgPool::connect(&config.database_url).await?;

    let state = build_state(db_pool, config.clone())?;
    spawn_token_sweeper(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-access-token"),
        ]);

    let app = router(state).layer(cors);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));

    info!(%addr, "starting identity-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(db_pool: PgPool, config: ServiceConfig) -> anyhow::Result<AppState> {
    let access_verifier = TokenVerifier::new(
        VerifierConfig::new(config.token_issuer.clone()),
        &config.access_token_secret,
    );

    let token_issuer = TokenIssuer::new(
        db_pool.clone(),
        TokenConfig {
            issuer: config.token_issuer.clone(),
            access_ttl_seconds: config.access_ttl_seconds,
            refresh_ttl_seconds: config.refresh_ttl_seconds,
        },
        &config.access_token_secret,
        &config.refresh_token_secret,
    );

    Ok(AppState {
        db: db_pool,
        access_verifier: Arc::new(access_verifier),
        token_issuer: Arc::new(token_issuer),
        config: Arc::new(config),
        metrics: Arc::new(AuthMetrics::new()?),
    })
}

/// Stale token records expire passively: lookups already ignore them, and
/// this task removes the rows so the table does not grow without bound.
/// Expiry therefore never depends on request traffic.
fn spawn_token_sweeper(state: AppState) {
    tokio::spawn(async move {
        let sweep_interval = Duration::from_secs(state.config.sweep_interval_seconds);
        loop {
            tokio::time::sleep(sweep_interval).await;
            match store::delete_expired_token_records(&state.db).await {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!(deleted, "swept expired token records");
                    }
                    state.metrics.swept(deleted);
                }
                Err(err) => {
                    error!(?err, "token record sweeper error");
                }
            }
        }
    });
}
