use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    token_refreshes: IntCounterVec,
    swept_token_records: IntCounter,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let token_refreshes = IntCounterVec::new(
            Opts::new(
                "auth_token_refreshes_total",
                "Count of refresh-token rotations grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(token_refreshes.clone()))?;

        let swept_token_records = IntCounter::new(
            "auth_swept_token_records_total",
            "Expired token records removed by the sweeper",
        )?;
        registry.register(Box::new(swept_token_records.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            token_refreshes,
            swept_token_records,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn token_refresh(&self, outcome: &str) {
        self.token_refreshes.with_label_values(&[outcome]).inc();
    }

    pub fn swept(&self, count: u64) {
        self.swept_token_records.inc_by(count);
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
