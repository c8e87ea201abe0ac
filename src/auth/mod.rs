pub mod error;
pub mod middleware;

pub use error::AuthError;
pub use middleware::require_token;

use std::sync::Arc;

/// Shared secret every request must carry. `None` disables the check.
#[derive(Debug, Clone, Default)]
pub struct AccessToken {
    expected: Option<Arc<str>>,
}

impl AccessToken {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn verify(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(());
        };
        match presented {
            None | Some("") => Err(AuthError::MissingToken),
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(AuthError::InvalidToken),
        }
    }
}
