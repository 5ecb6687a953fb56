use std::sync::Arc;
use std::time::Duration;

use oxgate_core::{Endpoint, KvStore, Request, Service};
use oxgate_errors::Result;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Token-bucket rate limiter over a shared key-value store. Each
/// (service, endpoint, client) triple gets a counter initialized to the
/// endpoint's budget with the window TTL attached at creation, then
/// decremented per request. `check_limit` and `record_request` are separate
/// calls and the pair is deliberately not atomic; concurrent bursts at a
/// window boundary may over-admit slightly.
pub struct TokenBucketLimiter {
    store: Arc<dyn KvStore>,
    window: Duration,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_window(store, DEFAULT_WINDOW)
    }

    pub fn with_window(store: Arc<dyn KvStore>, window: Duration) -> Self {
        Self { store, window }
    }

    fn key(service: &Service, path: &str, client: &str) -> String {
        format!("ratelimit:{}:{}:{}", service.id, path, client)
    }

    /// The authenticated subject when present, else the client IP.
    fn client_id(request: &Request) -> &str {
        if request.user_id.is_empty() {
            &request.client_ip
        } else {
            &request.user_id
        }
    }

    /// Create the counter with a full budget and the window TTL if it does
    /// not exist yet, so the first decrement of a window consumes exactly
    /// one token.
    async fn ensure_counter(&self, key: &str, limit: i64) -> Result<()> {
        match self.store.get(key).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                self.store
                    .set(key, limit.to_string().into_bytes(), Some(self.window))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Non-destructive check: true when the endpoint is unlimited or the
    /// counter still holds tokens.
    pub async fn check_limit(
        &self,
        request: &Request,
        service: &Service,
        endpoint: &Endpoint,
    ) -> Result<bool> {
        if endpoint.rate_limit <= 0 {
            return Ok(true);
        }
        let key = Self::key(service, &request.path, Self::client_id(request));
        match self.store.get(&key).await {
            Ok(bytes) => Ok(read_counter(&key, &bytes)? > 0),
            // No counter yet: the window has not started.
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Consume one token. Negative counts (possible when concurrent
    /// decrements race past zero) are clamped back to zero in the store,
    /// keeping the window expiry in place.
    pub async fn record_request(
        &self,
        request: &Request,
        service: &Service,
        endpoint: &Endpoint,
    ) -> Result<()> {
        if endpoint.rate_limit <= 0 {
            return Ok(());
        }
        let key = Self::key(service, &request.path, Self::client_id(request));
        self.ensure_counter(&key, endpoint.rate_limit).await?;
        let remaining = self.store.decrement_and_get(&key).await?;
        if remaining < 0 {
            self.store.set(&key, b"0".to_vec(), None).await?;
        }
        Ok(())
    }

    /// (remaining, configured limit) for a client, initializing the counter
    /// on first read with the same creation rule as `record_request`.
    pub async fn get_limit(
        &self,
        client_id: &str,
        service: &Service,
        endpoint: &Endpoint,
    ) -> Result<(i64, i64)> {
        if endpoint.rate_limit <= 0 {
            return Ok((endpoint.rate_limit, endpoint.rate_limit));
        }
        let key = Self::key(service, &endpoint.path, client_id);
        self.ensure_counter(&key, endpoint.rate_limit).await?;
        let bytes = self.store.get(&key).await?;
        let remaining = read_counter(&key, &bytes)?.max(0);
        Ok((remaining, endpoint.rate_limit))
    }
}

fn read_counter(key: &str, bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            oxgate_errors::GatewayError::Internal(format!("key `{key}` is not an integer counter"))
        })
}
