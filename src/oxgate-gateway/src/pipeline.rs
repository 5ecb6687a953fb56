use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use oxgate_auth::JwtAuth;
use oxgate_core::{Headers, Request, Response, ServiceRegistry, VALID_METHODS};
use oxgate_errors::{GatewayError, Result};
use serde_json::json;
use tracing::{error, warn};

use crate::cache::ResponseCache;
use crate::forward::Forwarder;
use crate::limiter::TokenBucketLimiter;
use crate::transform;

/// The request pipeline: validate, resolve, authenticate, rate-limit, cache,
/// transform, forward. Rate-limit accounting and cache failures are logged
/// and skipped; everything else short-circuits into an error response.
pub struct ProxyPipeline {
    registry: Arc<dyn ServiceRegistry>,
    auth: Arc<JwtAuth>,
    limiter: TokenBucketLimiter,
    cache: ResponseCache,
    forwarder: Arc<dyn Forwarder>,
}

impl ProxyPipeline {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        auth: Arc<JwtAuth>,
        limiter: TokenBucketLimiter,
        cache: ResponseCache,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            registry,
            auth,
            limiter,
            cache,
            forwarder,
        }
    }

    /// Run a request through the pipeline. Always yields a response: errors
    /// become JSON error bodies, and a panic anywhere in the stages is
    /// caught here so one poisoned request cannot take the worker down.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request.id.clone();
        let started = request.timestamp;
        match std::panic::AssertUnwindSafe(self.execute(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => error_response(&request_id, &err, started),
            Err(_) => {
                error!(request_id = %request_id, "request handling panicked");
                let err = GatewayError::Internal("internal server error".into());
                error_response(&request_id, &err, started)
            }
        }
    }

    async fn execute(&self, mut request: Request) -> Result<Response> {
        validate(&request)?;

        let services = self
            .registry
            .get_by_endpoint(&request.path, &request.method)
            .await?;
        let service = services.into_iter().next().ok_or_else(|| {
            GatewayError::NotFound(format!(
                "no active service for {} {}",
                request.method, request.path
            ))
        })?;
        let endpoint = service
            .find_endpoint(&request.path, &request.method)
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "no endpoint for {} {}",
                    request.method, request.path
                ))
            })?
            .clone();

        // Endpoint timeout overrides the service default; zero inherits.
        if endpoint.timeout > 0 {
            request.set_timeout(Duration::from_secs(endpoint.timeout as u64));
        } else if service.timeout > 0 {
            request.set_timeout(Duration::from_secs(service.timeout as u64));
        }

        if endpoint.auth_required {
            let (authenticated, user_id) = self.auth.authenticate(&request)?;
            if !authenticated {
                return Err(GatewayError::Unauthorized(
                    "authentication required".into(),
                ));
            }
            request.set_authenticated(true, user_id);
            self.auth.authorize(&request, &service, &endpoint)?;
        }

        if !self.limiter.check_limit(&request, &service, &endpoint).await? {
            return Err(GatewayError::RateLimitExceeded);
        }
        if let Err(e) = self.limiter.record_request(&request, &service, &endpoint).await {
            warn!(request_id = %request.id, error = %e, "rate limit accounting failed");
        }

        let cache_ttl = Duration::from_secs(endpoint.cache_ttl.max(0) as u64);
        if !cache_ttl.is_zero() {
            match self.cache.get(&request, Some(&service.id)).await {
                Ok(Some(cached)) => return Ok(cached),
                Ok(None) => {}
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "cache lookup failed");
                }
            }
        }

        let outbound = transform::transform_request(&request, &service, &endpoint);
        let backend = self.forwarder.send(&outbound, &service).await?;
        let mut response = transform::transform_response(&backend, &endpoint);
        response.set_latency(request.timestamp);

        if !cache_ttl.is_zero() {
            if let Err(e) = self
                .cache
                .set(&request, Some(&service.id), &response, cache_ttl)
                .await
            {
                warn!(request_id = %request.id, error = %e, "cache store failed");
            }
        }

        Ok(response)
    }
}

fn validate(request: &Request) -> Result<()> {
    if !VALID_METHODS.contains(&request.method.as_str()) {
        return Err(GatewayError::InvalidInput(format!(
            "invalid HTTP method: {}",
            request.method
        )));
    }
    if !request.path.starts_with('/') {
        return Err(GatewayError::InvalidInput(format!(
            "invalid path: {}",
            request.path
        )));
    }
    Ok(())
}

/// Synthesize a JSON error response carrying the request id so clients can
/// correlate with the gateway's logs.
pub fn error_response(request_id: &str, err: &GatewayError, started: DateTime<Utc>) -> Response {
    let body = json!({
        "code": err.status_code(),
        "message": err.to_string(),
        "request_id": request_id,
    });
    let mut headers = Headers::new();
    headers.set("Content-Type", "application/json");
    let mut response = Response::new(
        request_id,
        err.status_code(),
        headers,
        serde_json::to_vec(&body).unwrap_or_default(),
    );
    response.set_latency(started);
    response
}
