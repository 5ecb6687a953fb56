use oxgate_core::{Endpoint, Request, Response, Service};

/// Headers meaningful only for a single transport leg; a proxy must not
/// forward them to the next leg.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "Connection",
    "Keep-Alive",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "TE",
    "Trailers",
    "Transfer-Encoding",
    "Upgrade",
];

const GATEWAY_HEADER: &str = "X-Gateway";

fn gateway_ident() -> String {
    format!("oxgate/{}", env!("CARGO_PKG_VERSION"))
}

fn strip_hop_by_hop(headers: &mut oxgate_core::Headers) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Produce the outbound request: hop-by-hop headers stripped, service and
/// forwarding headers injected, endpoint rewrites applied. The caller's
/// request is never mutated.
pub fn transform_request(request: &Request, service: &Service, endpoint: &Endpoint) -> Request {
    let mut out = request.clone();
    strip_hop_by_hop(&mut out.headers);
    if let Some(host) = request.headers.get("Host") {
        let host = host.to_string();
        out.headers.set("X-Forwarded-Host", host);
    }
    out.headers.set("X-Service-ID", service.id.clone());
    out.headers.set("X-Service-Name", service.name.clone());
    out.headers.set("X-Forwarded-For", request.client_ip.clone());
    out.headers.set("X-Request-ID", request.id.clone());
    for (name, value) in &endpoint.transform.request {
        out.headers.set(name.clone(), value.clone());
    }
    out
}

/// Produce the client-facing response: hop-by-hop headers stripped, gateway
/// header added, endpoint rewrites applied. The forwarder's response is
/// never mutated.
pub fn transform_response(response: &Response, endpoint: &Endpoint) -> Response {
    let mut out = response.clone();
    strip_hop_by_hop(&mut out.headers);
    out.headers.set(GATEWAY_HEADER, gateway_ident());
    for (name, value) in &endpoint.transform.response {
        out.headers.set(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxgate_core::Headers;

    fn hopped_headers() -> Headers {
        let mut headers = Headers::new();
        for name in HOP_BY_HOP_HEADERS {
            headers.set(name, "x");
        }
        headers.set("Host", "gateway.local");
        headers.set("Accept", "application/json");
        headers
    }

    fn fixture() -> (Request, Service, Endpoint) {
        let request = Request::new("GET", "/v1/users", hopped_headers(), vec![], vec![], "10.0.0.9");
        let endpoint = Endpoint {
            path: "/v1/users".into(),
            methods: vec!["GET".into()],
            ..Endpoint::default()
        };
        let mut service = Service::new("users", "http://users:8080", 10, 0);
        service.add_endpoint(endpoint.clone());
        (request, service, endpoint)
    }

    #[test]
    fn request_transform_strips_hop_by_hop_headers() {
        let (request, service, endpoint) = fixture();
        let out = transform_request(&request, &service, &endpoint);
        for name in HOP_BY_HOP_HEADERS {
            assert!(!out.headers.contains(name), "{name} survived");
        }
        assert_eq!(out.headers.get("Accept"), Some("application/json"));
    }

    #[test]
    fn request_transform_injects_forwarding_headers() {
        let (request, service, endpoint) = fixture();
        let out = transform_request(&request, &service, &endpoint);
        assert_eq!(out.headers.get("X-Service-ID"), Some(service.id.as_str()));
        assert_eq!(out.headers.get("X-Service-Name"), Some("users"));
        assert_eq!(out.headers.get("X-Forwarded-For"), Some("10.0.0.9"));
        assert_eq!(out.headers.get("X-Request-ID"), Some(request.id.as_str()));
        assert_eq!(out.headers.get("X-Forwarded-Host"), Some("gateway.local"));
    }

    #[test]
    fn request_transform_never_mutates_the_original() {
        let (request, service, endpoint) = fixture();
        let before = request.headers.clone();
        let _ = transform_request(&request, &service, &endpoint);
        assert_eq!(request.headers, before);
    }

    #[test]
    fn endpoint_rewrites_are_applied() {
        let (request, service, mut endpoint) = fixture();
        endpoint
            .transform
            .request
            .insert("X-Tenant".into(), "acme".into());
        endpoint
            .transform
            .response
            .insert("Cache-Control".into(), "no-store".into());

        let out = transform_request(&request, &service, &endpoint);
        assert_eq!(out.headers.get("X-Tenant"), Some("acme"));

        let response = Response::new(request.id.clone(), 200, Headers::new(), vec![]);
        let out = transform_response(&response, &endpoint);
        assert_eq!(out.headers.get("Cache-Control"), Some("no-store"));
    }

    #[test]
    fn response_transform_strips_hop_by_hop_and_brands() {
        let (request, _, endpoint) = fixture();
        let response = Response::new(request.id, 200, hopped_headers(), vec![]);
        let out = transform_response(&response, &endpoint);
        for name in HOP_BY_HOP_HEADERS {
            assert!(!out.headers.contains(name), "{name} survived");
        }
        assert!(out.headers.get("X-Gateway").unwrap().starts_with("oxgate/"));
        // Original untouched.
        assert!(response.headers.contains("Connection"));
    }
}
