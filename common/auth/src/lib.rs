pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod roles;
pub mod verifier;

pub use claims::Claims;
pub use config::VerifierConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use guards::{ensure_role, GuardError};
pub use roles::{ROLE_ADMIN, ROLE_MEMBER};
pub use verifier::TokenVerifier;
