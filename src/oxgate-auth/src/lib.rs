use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use oxgate_core::{Endpoint, Headers, Request, Service};
use oxgate_errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};

pub mod claims;

pub use claims::{ClaimSet, ClaimValue};

/// Roles granting access to any service endpoint.
const WILDCARD_ROLES: [&str; 2] = ["admin", "*"];

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    extra: BTreeMap<String, ClaimValue>,
}

/// Stateless HS256 token issuance and verification, plus the gateway's
/// authentication and authorization decisions. There is no revocation list;
/// a token is valid until it expires.
pub struct JwtAuth {
    secret: Vec<u8>,
    issuer: String,
    expiration: Duration,
}

impl JwtAuth {
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>, expiration: Duration) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            expiration,
        }
    }

    /// Extract a bearer credential and resolve it to a subject id. A missing
    /// credential is not an error: the caller decides whether anonymous
    /// access is acceptable. An invalid or expired credential is.
    pub fn authenticate(&self, request: &Request) -> Result<(bool, String)> {
        let token = bearer_token(&request.headers);
        if token.is_empty() {
            return Ok((false, String::new()));
        }
        let claims = self.validate_token(&token)?;
        let subject = claims.str("sub")?;
        Ok((true, subject.to_string()))
    }

    /// Grant access when the endpoint is open, or when the authenticated
    /// identity carries a wildcard role or one exactly matching
    /// `service.name + ":" + endpoint.path`. No hierarchy, no inheritance.
    pub fn authorize(&self, request: &Request, service: &Service, endpoint: &Endpoint) -> Result<()> {
        if !endpoint.auth_required {
            return Ok(());
        }
        if !request.authenticated {
            return Err(GatewayError::Unauthorized(
                "authentication required".into(),
            ));
        }
        let token = bearer_token(&request.headers);
        if token.is_empty() {
            return Err(GatewayError::Unauthorized(
                "authorization required".into(),
            ));
        }
        let claims = self.validate_token(&token)?;
        let roles = match claims.get("roles") {
            None => {
                return Err(GatewayError::Forbidden(
                    "insufficient permissions".into(),
                ));
            }
            Some(_) => claims.list("roles")?,
        };

        let required = format!("{}:{}", service.name, endpoint.path);
        let granted = roles
            .iter()
            .any(|role| WILDCARD_ROLES.contains(&role.as_str()) || *role == required);
        if !granted {
            return Err(GatewayError::Forbidden(
                "insufficient permissions".into(),
            ));
        }
        Ok(())
    }

    /// Issue a signed token for `subject` with the issuer and expiration
    /// embedded, merging in any custom claims.
    pub fn generate_token(&self, subject: &str, extra: ClaimSet) -> Result<String> {
        let now = Utc::now().timestamp();
        let payload = TokenPayload {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: now,
            exp: now + self.expiration.as_secs() as i64,
            extra: extra.into_iter().collect(),
        };
        encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| GatewayError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verify signature, issuer and expiry, returning the full claim set
    /// (registered claims included).
    pub fn validate_token(&self, token: &str) -> Result<ClaimSet> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        let data = decode::<TokenPayload>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| GatewayError::Unauthorized(format!("invalid token: {e}")))?;

        let payload = data.claims;
        let mut claims: ClaimSet = payload.extra.into_iter().collect();
        claims.insert("iss", ClaimValue::Str(payload.iss));
        claims.insert("sub", ClaimValue::Str(payload.sub));
        claims.insert("iat", ClaimValue::Int(payload.iat));
        claims.insert("exp", ClaimValue::Int(payload.exp));
        Ok(claims)
    }
}

/// Token from the Authorization header; a raw header value is accepted when
/// the `Bearer ` prefix is absent.
fn bearer_token(headers: &Headers) -> String {
    match headers.get("Authorization") {
        Some(value) => value.strip_prefix("Bearer ").unwrap_or(value).to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> JwtAuth {
        JwtAuth::new(*b"test-secret", "oxgate-test", Duration::from_secs(3600))
    }

    fn roles(values: &[&str]) -> ClaimSet {
        let mut claims = ClaimSet::new();
        claims.insert(
            "roles",
            ClaimValue::List(values.iter().map(|r| r.to_string()).collect()),
        );
        claims
    }

    fn request_with_token(token: &str) -> Request {
        let mut headers = Headers::new();
        headers.set("Authorization", format!("Bearer {token}"));
        Request::new("GET", "/v1/users", headers, vec![], vec![], "10.0.0.1")
    }

    fn service_with_endpoint(auth_required: bool) -> (Service, Endpoint) {
        let endpoint = Endpoint {
            path: "/v1/users".into(),
            methods: vec!["GET".into()],
            auth_required,
            ..Endpoint::default()
        };
        let mut svc = Service::new("users", "http://users:8080", 10, 0);
        svc.add_endpoint(endpoint.clone());
        (svc, endpoint)
    }

    #[test]
    fn token_roundtrip_recovers_claims() {
        let auth = auth();
        let token = auth.generate_token("user-1", roles(&["admin"])).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.str("sub").unwrap(), "user-1");
        assert_eq!(claims.str("iss").unwrap(), "oxgate-test");
        assert_eq!(claims.list("roles").unwrap(), ["admin"]);
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = auth();
        let now = Utc::now().timestamp();
        let payload = TokenPayload {
            iss: "oxgate-test".into(),
            sub: "user-1".into(),
            iat: now - 7200,
            exp: now - 3600,
            extra: BTreeMap::new(),
        };
        let token = encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(auth.validate_token(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let other = JwtAuth::new(*b"test-secret", "someone-else", Duration::from_secs(3600));
        let token = other.generate_token("user-1", ClaimSet::new()).unwrap();
        assert!(auth().validate_token(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = JwtAuth::new(*b"other-secret", "oxgate-test", Duration::from_secs(3600));
        let token = other.generate_token("user-1", ClaimSet::new()).unwrap();
        assert!(auth().validate_token(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn missing_credential_is_anonymous_not_an_error() {
        let request = Request::new("GET", "/v1/users", Headers::new(), vec![], vec![], "10.0.0.1");
        let (authenticated, subject) = auth().authenticate(&request).unwrap();
        assert!(!authenticated);
        assert!(subject.is_empty());
    }

    #[test]
    fn authenticate_resolves_subject() {
        let auth = auth();
        let token = auth.generate_token("user-7", ClaimSet::new()).unwrap();
        let request = request_with_token(&token);
        let (authenticated, subject) = auth.authenticate(&request).unwrap();
        assert!(authenticated);
        assert_eq!(subject, "user-7");
    }

    #[test]
    fn garbage_token_is_an_error() {
        let request = request_with_token("not-a-jwt");
        assert!(auth().authenticate(&request).unwrap_err().is_unauthorized());
    }

    #[test]
    fn authorize_is_a_noop_for_open_endpoints() {
        let (service, endpoint) = service_with_endpoint(false);
        let request = Request::new("GET", "/v1/users", Headers::new(), vec![], vec![], "10.0.0.1");
        assert!(auth().authorize(&request, &service, &endpoint).is_ok());
    }

    #[test]
    fn authorize_requires_prior_authentication() {
        let (service, endpoint) = service_with_endpoint(true);
        let auth = auth();
        let token = auth.generate_token("user-1", roles(&["admin"])).unwrap();
        let request = request_with_token(&token);
        // Authenticated flag never set by the pipeline.
        let err = auth.authorize(&request, &service, &endpoint).unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn wildcard_and_exact_roles_grant_access() {
        let (service, endpoint) = service_with_endpoint(true);
        let auth = auth();
        for granted in ["admin", "*", "users:/v1/users"] {
            let token = auth.generate_token("user-1", roles(&[granted])).unwrap();
            let mut request = request_with_token(&token);
            request.set_authenticated(true, "user-1");
            assert!(auth.authorize(&request, &service, &endpoint).is_ok());
        }
    }

    #[test]
    fn insufficient_role_is_forbidden() {
        let (service, endpoint) = service_with_endpoint(true);
        let auth = auth();
        let token = auth
            .generate_token("user-1", roles(&["orders:/v1/orders"]))
            .unwrap();
        let mut request = request_with_token(&token);
        request.set_authenticated(true, "user-1");
        let err = auth.authorize(&request, &service, &endpoint).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn missing_roles_claim_is_forbidden() {
        let (service, endpoint) = service_with_endpoint(true);
        let auth = auth();
        let token = auth.generate_token("user-1", ClaimSet::new()).unwrap();
        let mut request = request_with_token(&token);
        request.set_authenticated(true, "user-1");
        let err = auth.authorize(&request, &service, &endpoint).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn numeric_subject_claim_is_rejected() {
        let auth = auth();
        let now = Utc::now().timestamp();
        // `sub` must deserialize as a string; a numeric subject fails the
        // payload shape before any claim accessor runs.
        let payload = serde_json::json!({
            "iss": "oxgate-test",
            "sub": 42,
            "iat": now,
            "exp": now + 3600,
        });
        let token = encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(auth.validate_token(&token).is_err());
    }
}
