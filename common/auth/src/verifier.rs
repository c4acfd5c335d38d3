use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::VerifierConfig;
use crate::error::AuthResult;

/// Verifies HMAC-signed tokens against a single process-local secret.
///
/// The service signs access and refresh tokens with two distinct secrets,
/// so it holds two verifiers, one per secret.
#[derive(Clone)]
pub struct TokenVerifier {
    config: VerifierConfig,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig, secret: &str) -> Self {
        Self {
            config,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Signature and expiry check; any failure is an invalid token.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &self.decoding_key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, "verified token successfully");
        Ok(claims)
    }
}
