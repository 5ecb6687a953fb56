use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Headers;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An inbound request as the pipeline sees it, decoupled from the wire
/// representation. Owned by a single pipeline invocation; the auth stage is
/// the only one that mutates it (authenticated flag and user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub client_ip: String,
    pub timestamp: DateTime<Utc>,
    pub authenticated: bool,
    pub user_id: String,
    pub timeout: Duration,
}

impl Request {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: Headers,
        query: Vec<(String, String)>,
        body: Vec<u8>,
        client_ip: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            path: path.into(),
            headers,
            query,
            body,
            client_ip: client_ip.into(),
            timestamp: Utc::now(),
            authenticated: false,
            user_id: String::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn set_authenticated(&mut self, authenticated: bool, user_id: impl Into<String>) {
        self.authenticated = authenticated;
        self.user_id = user_id.into();
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new("GET", "/v1/users", Headers::new(), vec![], vec![], "10.0.0.1")
    }

    #[test]
    fn new_request_has_defaults() {
        let req = request();
        assert!(!req.id.is_empty());
        assert!(!req.authenticated);
        assert!(req.user_id.is_empty());
        assert_eq!(req.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(request().id, request().id);
    }

    #[test]
    fn set_authenticated_records_subject() {
        let mut req = request();
        req.set_authenticated(true, "user-42");
        assert!(req.authenticated);
        assert_eq!(req.user_id, "user-42");
    }
}
