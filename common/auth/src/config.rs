/// Runtime configuration for token verification.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl VerifierConfig {
    /// Construct config with sensible defaults (30 second leeway).
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            leeway_seconds: 30,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}
