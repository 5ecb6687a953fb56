use std::collections::HashMap;

use oxgate_errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

fn def_id() -> String {
    Uuid::new_v4().into()
}

fn def_version() -> String {
    "1.0".into()
}

fn def_active() -> bool {
    true
}

pub const VALID_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// A registered backend service reachable through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Service {
    #[serde(default = "def_id")]
    pub id: String,
    pub name: String,
    #[serde(default = "def_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Default backend timeout in seconds; 0 falls back to the request default.
    #[serde(default)]
    pub timeout: i64,
    #[serde(default, rename = "retryCount")]
    pub retry_count: i64,
    #[serde(default = "def_active", rename = "isActive")]
    pub active: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// A (path, methods) rule on a service carrying its own auth, rate-limit,
/// cache and circuit-breaker policy. Owned by exactly one service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Endpoint {
    pub path: String,
    pub methods: Vec<String>,
    /// Requests per window; 0 means unlimited.
    #[serde(default, rename = "rateLimit")]
    pub rate_limit: i64,
    #[serde(default, rename = "authRequired")]
    pub auth_required: bool,
    /// Timeout override in seconds; 0 inherits the service timeout.
    #[serde(default)]
    pub timeout: i64,
    #[serde(default, rename = "retryCount")]
    pub retry_count: i64,
    /// Delay between retries in milliseconds.
    #[serde(default, rename = "retryDelay")]
    pub retry_delay: i64,
    /// Response cache TTL in seconds; 0 disables caching.
    #[serde(default, rename = "cacheTTL")]
    pub cache_ttl: i64,
    #[serde(default, rename = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

/// Circuit-breaker policy. Carried as configuration; not wired into the
/// request pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircuitBreakerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Fraction of failed requests that trips the breaker, in [0, 1].
    #[serde(default, rename = "failureThreshold")]
    pub failure_threshold: f64,
    #[serde(default, rename = "minRequestCount")]
    pub min_request_count: i64,
    /// Cooldown in seconds once the breaker is open.
    #[serde(default, rename = "breakDuration")]
    pub break_duration: i64,
    #[serde(default, rename = "halfOpenRequests")]
    pub half_open_requests: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ttl: i64,
}

/// Static header rewrites applied during request/response transformation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    #[serde(default)]
    pub request: HashMap<String, String>,
    #[serde(default)]
    pub response: HashMap<String, String>,
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: i64,
        retry_count: i64,
    ) -> Self {
        Self {
            id: def_id(),
            name: name.into(),
            version: def_version(),
            description: String::new(),
            base_url: base_url.into(),
            timeout,
            retry_count,
            active: true,
            metadata: HashMap::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.push(endpoint);
    }

    /// First declared endpoint whose path equals `path` exactly and whose
    /// methods contain `method` or the `*` wildcard. Declaration order
    /// breaks ties between endpoints sharing a path.
    pub fn find_endpoint(&self, path: &str, method: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.path == path && e.allows_method(method))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GatewayError::InvalidInput("service name is required".into()));
        }
        if self.base_url.is_empty() {
            return Err(GatewayError::InvalidInput(
                "service base URL is required".into(),
            ));
        }
        if Url::parse(&self.base_url).is_err() {
            return Err(GatewayError::InvalidInput(format!(
                "invalid base URL: {}",
                self.base_url
            )));
        }
        if self.timeout < 0 {
            return Err(GatewayError::InvalidInput(
                "service timeout cannot be negative".into(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(GatewayError::InvalidInput(
                "at least one endpoint is required".into(),
            ));
        }
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            endpoint
                .validate()
                .map_err(|e| GatewayError::InvalidInput(format!("endpoint {i}: {e}")))?;
        }
        Ok(())
    }
}

impl Endpoint {
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method || m == "*")
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(GatewayError::InvalidInput("endpoint path is required".into()));
        }
        if !self.path.starts_with('/') {
            return Err(GatewayError::InvalidInput(
                "endpoint path must start with /".into(),
            ));
        }
        if self.methods.is_empty() {
            return Err(GatewayError::InvalidInput(
                "at least one HTTP method is required".into(),
            ));
        }
        for method in &self.methods {
            if method != "*" && !VALID_METHODS.contains(&method.as_str()) {
                return Err(GatewayError::InvalidInput(format!(
                    "invalid HTTP method: {method}"
                )));
            }
        }
        if self.rate_limit < 0 {
            return Err(GatewayError::InvalidInput(
                "rate limit cannot be negative".into(),
            ));
        }
        if self.timeout < 0 {
            return Err(GatewayError::InvalidInput("timeout cannot be negative".into()));
        }
        if self.retry_count < 0 {
            return Err(GatewayError::InvalidInput(
                "retry count cannot be negative".into(),
            ));
        }
        if self.retry_delay < 0 {
            return Err(GatewayError::InvalidInput(
                "retry delay cannot be negative".into(),
            ));
        }
        if self.cache_ttl < 0 {
            return Err(GatewayError::InvalidInput("cache TTL is invalid".into()));
        }
        if self.circuit_breaker.enabled {
            let cb = &self.circuit_breaker;
            if !(0.0..=1.0).contains(&cb.failure_threshold) {
                return Err(GatewayError::InvalidInput(
                    "circuit breaker failure threshold must be between 0 and 1".into(),
                ));
            }
            if cb.min_request_count < 0 || cb.break_duration < 0 || cb.half_open_requests < 0 {
                return Err(GatewayError::InvalidInput(
                    "circuit breaker settings cannot be negative".into(),
                ));
            }
        }
        if self.cache.enabled && self.cache.ttl < 0 {
            return Err(GatewayError::InvalidInput("cache TTL is invalid".into()));
        }
        Ok(())
    }
}
