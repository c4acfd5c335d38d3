use axum::http::StatusCode;

use crate::AuthContext;

#[derive(Debug, Clone)]
pub enum GuardError {
    Forbidden { required: Vec<String> },
}

impl GuardError {
    pub fn into_response(self) -> (StatusCode, String) {
        match self {
            GuardError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                if required.is_empty() {
                    "Insufficient role".to_string()
                } else {
                    format!("Insufficient role. Required one of: {}", required.join(", "))
                },
            ),
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_response()
    }
}

/// Role gate over the claims attached at signing time. A role changed in
/// the database takes effect only once the user re-authenticates and
/// receives a freshly signed token.
pub fn ensure_role(auth: &AuthContext, allowed: &[&str]) -> Result<(), GuardError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let has_role = allowed.iter().any(|required| auth.has_role(required));

    if has_role {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.iter().map(|value| value.to_string()).collect(),
        })
    }
}
