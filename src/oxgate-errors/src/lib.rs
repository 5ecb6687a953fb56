use thiserror::Error;

/// Typed errors produced by every gateway component. Each kind carries a
/// stable HTTP status code that the transport layer applies when it turns a
/// failed pipeline invocation into a wire response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::AlreadyExists(_) => 409,
            GatewayError::InvalidInput(_) => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::RateLimitExceeded => 429,
            GatewayError::Timeout(_) => 504,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }

    /// A store-level miss. Callers that treat absence as a non-error (cache
    /// lookups, first-window rate-limit reads) branch on this.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
