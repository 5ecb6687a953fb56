use std::sync::Arc;
use std::time::Duration;

use oxgate_core::{KvStore, Request, Response};
use oxgate_errors::Result;

/// All cache keys live under this prefix so `clear` cannot touch rate-limit
/// or registry keys sharing the store.
const KEY_PREFIX: &str = "cache:";

/// Response cache over a shared key-value store. Entries are JSON-serialized
/// responses keyed by a deterministic request fingerprint:
/// `cache:{service_id}:{path}:{method}` when the service is known, else
/// `cache:{method}:{path}`.
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(request: &Request, service_id: Option<&str>) -> String {
        match service_id {
            Some(id) => format!("{KEY_PREFIX}{}:{}:{}", id, request.path, request.method),
            None => format!("{KEY_PREFIX}{}:{}", request.method, request.path),
        }
    }

    /// Look up a cached response. A store-level miss is `Ok(None)`, never an
    /// error; transport failures propagate. On a hit the response comes back
    /// flagged as cached, with its latency recomputed against the incoming
    /// request's start time so cached responses still report honest
    /// end-to-end latency.
    pub async fn get(&self, request: &Request, service_id: Option<&str>) -> Result<Option<Response>> {
        let key = Self::key(request, service_id);
        match self.store.get(&key).await {
            Ok(bytes) => {
                let mut response: Response = serde_json::from_slice(&bytes)?;
                response.set_cached(true);
                response.set_latency(request.timestamp);
                Ok(Some(response))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a response under the request's fingerprint. A zero `ttl` sets
    /// no expiration; gating on the endpoint's cache TTL is the caller's
    /// job, not the cache's.
    pub async fn set(
        &self,
        request: &Request,
        service_id: Option<&str>,
        response: &Response,
        ttl: Duration,
    ) -> Result<()> {
        let key = Self::key(request, service_id);
        let bytes = serde_json::to_vec(response)?;
        let ttl = if ttl.is_zero() { None } else { Some(ttl) };
        self.store.set(&key, bytes, ttl).await
    }

    pub async fn delete(&self, request: &Request, service_id: Option<&str>) -> Result<()> {
        self.store.delete(&Self::key(request, service_id)).await
    }

    /// Remove every entry in the cache namespace, leaving unrelated keys
    /// untouched.
    pub async fn clear(&self) -> Result<()> {
        for key in self.store.scan_keys(&format!("{KEY_PREFIX}*")).await? {
            self.store.delete(&key).await?;
        }
        Ok(())
    }
}
