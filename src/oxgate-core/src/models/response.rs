use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Headers;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A backend (or synthesized) response. Immutable after construction apart
/// from the latency and cached-flag setters. Cached copies are serialized
/// as JSON by the response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_length: usize,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: i64,
    pub cached: bool,
}

impl Response {
    pub fn new(
        request_id: impl Into<String>,
        status_code: u16,
        headers: Headers,
        body: Vec<u8>,
    ) -> Self {
        let content_type = headers
            .get("Content-Type")
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content_length = body.len();
        Self {
            request_id: request_id.into(),
            status_code,
            headers,
            body,
            content_type,
            content_length,
            timestamp: Utc::now(),
            latency_ms: 0,
            cached: false,
        }
    }

    /// Record end-to-end latency relative to the request's start time.
    pub fn set_latency(&mut self, start: DateTime<Utc>) {
        self.latency_ms = (Utc::now() - start).num_milliseconds();
    }

    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }
}
