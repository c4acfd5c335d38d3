use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use common_auth::TokenVerifier;
use sqlx::PgPool;

use crate::config::ServiceConfig;
use crate::metrics::AuthMetrics;
use crate::tokens::TokenIssuer;
use crate::user_handlers::{
    delete_user, login_user, logout_user, refresh_session, register_user, update_password,
    update_user, validate_role, verify_refresh_token, verify_token, verify_user,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub access_verifier: Arc<TokenVerifier>,
    pub token_issuer: Arc<TokenIssuer>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.access_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.token_issuer.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Response, StatusCode> {
    state
        .metrics
        .render()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// All operation routes live under the versioned prefix; health and
/// metrics sit outside it.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/login", post(login_user))
        .route("/logout", post(logout_user))
        .route("/register", post(register_user))
        .route("/refreshtoken", post(refresh_session))
        .route("/validateRole", post(validate_role))
        .route("/updatePassword", post(update_password))
        .route("/verify/token", post(verify_token))
        .route("/verify/refreshToken", post(verify_refresh_token))
        .route("/verify/user", post(verify_user))
        .route("/updateUser", post(update_user))
        .route("/deleteUser", delete(delete_user));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api)
        .with_state(state)
}
