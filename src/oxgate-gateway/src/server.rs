use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::tokio::TokioIo;
use oxgate_core::{Headers, Service, ServiceRegistry};
use oxgate_errors::GatewayError;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::pipeline::ProxyPipeline;

const ADMIN_PREFIX: &str = "/admin/services";

/// HTTP front door: a small admin surface for service registration plus a
/// catch-all that hands everything else to the proxy pipeline.
pub struct GatewayServer {
    pipeline: Arc<ProxyPipeline>,
    registry: Arc<dyn ServiceRegistry>,
}

impl GatewayServer {
    pub fn new(pipeline: Arc<ProxyPipeline>, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { pipeline, registry }
    }

    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("oxgate listening on {}", addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            let me = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let conn = http1::Builder::new().serve_connection(
                    io,
                    service_fn(move |req| {
                        let me = me.clone();
                        async move { me.handle(req, peer.ip().to_string()).await }
                    }),
                );
                if let Err(e) = conn.await {
                    error!("connection error: {e}");
                }
            });
        }
    }

    async fn handle(
        &self,
        req: hyper::Request<Incoming>,
        client_ip: String,
    ) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        let path = parts.uri.path().to_string();

        if parts.method == Method::GET && path == "/health" {
            let body = json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")});
            return Ok(json_response(StatusCode::OK, &body));
        }

        if path == ADMIN_PREFIX || path.starts_with("/admin/services/") {
            return Ok(self.admin(&parts.method, &path, &body).await);
        }

        let mut headers = Headers::new();
        for (name, value) in &parts.headers {
            headers.append(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        let query: Vec<(String, String)> =
            form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes())
                .into_owned()
                .collect();
        let request = oxgate_core::Request::new(
            parts.method.as_str(),
            path,
            headers,
            query,
            body.to_vec(),
            client_ip,
        );

        let response = self.pipeline.handle(request).await;
        Ok(wire_response(response))
    }

    async fn admin(&self, method: &Method, path: &str, body: &Bytes) -> Response<Full<Bytes>> {
        match self.admin_inner(method, path, body).await {
            Ok((status, value)) => json_response(status, &value),
            Err(e) => error_json(&e),
        }
    }

    async fn admin_inner(
        &self,
        method: &Method,
        path: &str,
        body: &Bytes,
    ) -> std::result::Result<(StatusCode, serde_json::Value), GatewayError> {
        let id = path
            .strip_prefix(ADMIN_PREFIX)
            .unwrap_or("")
            .trim_start_matches('/');

        match (method, id.is_empty()) {
            (&Method::GET, true) => {
                let services = self.registry.get_all().await?;
                Ok((StatusCode::OK, serde_json::to_value(services)?))
            }
            (&Method::POST, true) => {
                let service: Service = serde_json::from_slice(body)
                    .map_err(|e| GatewayError::InvalidInput(format!("invalid service: {e}")))?;
                service.validate()?;
                let created = self.registry.create(service).await?;
                Ok((StatusCode::CREATED, serde_json::to_value(created)?))
            }
            (&Method::GET, false) => {
                let service = self.registry.get(id).await?;
                Ok((StatusCode::OK, serde_json::to_value(service)?))
            }
            (&Method::PUT, false) => {
                let mut service: Service = serde_json::from_slice(body)
                    .map_err(|e| GatewayError::InvalidInput(format!("invalid service: {e}")))?;
                service.id = id.to_string();
                service.validate()?;
                let updated = self.registry.update(service).await?;
                Ok((StatusCode::OK, serde_json::to_value(updated)?))
            }
            (&Method::DELETE, false) => {
                self.registry.delete(id).await?;
                Ok((StatusCode::NO_CONTENT, serde_json::Value::Null))
            }
            _ => Err(GatewayError::InvalidInput(format!(
                "unsupported admin request: {method} {path}"
            ))),
        }
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let bytes = if body.is_null() {
        Vec::new()
    } else {
        serde_json::to_vec(body).unwrap_or_default()
    };
    let mut resp = Response::new(Full::new(Bytes::from(bytes)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn error_json(err: &GatewayError) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({"code": err.status_code(), "message": err.to_string()});
    json_response(status, &body)
}

/// Marshal a pipeline response onto the wire. Header names or values hyper
/// cannot represent are dropped rather than failing the whole response.
fn wire_response(internal: oxgate_core::Response) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(internal.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = Response::new(Full::new(Bytes::from(internal.body)));
    *resp.status_mut() = status;
    for (name, values) in internal.headers.iter() {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    resp.headers_mut().append(name.clone(), value);
                }
            }
        }
    }
    if let Ok(value) = HeaderValue::from_str(&internal.request_id) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}
