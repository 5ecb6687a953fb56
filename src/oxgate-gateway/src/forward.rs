use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use http::Method;
use oxgate_core::{Headers, Request, Response, Service};
use oxgate_errors::{GatewayError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::info;
use url::Url;

/// Outbound call to a resolved backend. A trait seam so the pipeline can be
/// exercised against a stub in tests.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Issue the request against `service`'s base URL. Transport failures
    /// are errors; a non-2xx backend status is not — it comes back as a
    /// normal response for the caller to interpret.
    async fn send(&self, request: &Request, service: &Service) -> Result<Response>;
}

/// Forwarder over a shared pooled reqwest client; connections to the same
/// backend are reused across calls.
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

fn target_url(request: &Request, service: &Service) -> Result<Url> {
    let raw = format!("{}{}", service.base_url.trim_end_matches('/'), request.path);
    let mut url = Url::parse(&raw)
        .map_err(|e| GatewayError::InvalidInput(format!("invalid target URL `{raw}`: {e}")))?;
    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

fn outbound_headers(request: &Request) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, values) in request.headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::InvalidInput(format!("invalid header name: {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|e| GatewayError::InvalidInput(format!("invalid header value: {e}")))?;
            headers.append(name.clone(), value);
        }
    }
    let forwarded_for = HeaderValue::from_str(&request.client_ip)
        .map_err(|e| GatewayError::InvalidInput(format!("invalid client IP: {e}")))?;
    headers.insert("x-forwarded-for", forwarded_for);
    let request_id = HeaderValue::from_str(&request.id)
        .map_err(|e| GatewayError::Internal(format!("invalid request id: {e}")))?;
    headers.insert("x-request-id", request_id);
    Ok(headers)
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn send(&self, request: &Request, service: &Service) -> Result<Response> {
        let url = target_url(request, service)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| GatewayError::InvalidInput(format!("invalid method: {}", request.method)))?;
        let headers = outbound_headers(request)?;

        let started = Utc::now();
        let backend_response = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(format!("backend `{}` timed out", service.name))
                } else {
                    GatewayError::ServiceUnavailable(format!(
                        "backend `{}` unreachable: {e}",
                        service.name
                    ))
                }
            })?;

        let status = backend_response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in backend_response.headers() {
            headers.append(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        let body = backend_response.bytes().await.map_err(|e| {
            GatewayError::ServiceUnavailable(format!(
                "failed to read response from `{}`: {e}",
                service.name
            ))
        })?;

        let mut response = Response::new(request.id.clone(), status, headers, body.to_vec());
        response.set_latency(started);

        info!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            service = %service.name,
            status,
            latency_ms = response.latency_ms,
            "request forwarded"
        );
        Ok(response)
    }
}
