use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use oxgate_errors::{GatewayError, Result};
use regex::Regex;

/// The key-value operations the gateway core needs from its backing store.
/// A Redis-shaped contract: values are raw bytes, counters are decimal
/// strings, expirations are per-key.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`. A `ttl` of `None` leaves any existing
    /// expiration in place (KEEPTTL semantics); new keys never expire.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Fails with `NotFound` on a missing or expired key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically decrement the integer counter at `key` and return the new
    /// value. A missing key counts down from zero.
    async fn decrement_and_get(&self, key: &str) -> Result<i64>;

    /// Attach an expiration to an existing key. Returns false when the key
    /// does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Keys matching `pattern`, where `*` matches any run of characters.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            bytes,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// In-process `KvStore` for single-instance deployments and tests. Expired
/// entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_counter(key: &str, bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| GatewayError::Internal(format!("key `{key}` is not an integer counter")))
}

fn pattern_regex(pattern: &str) -> Result<Regex> {
    let expr = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&expr).map_err(|e| GatewayError::Internal(format!("bad key pattern: {e}")))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        match self.map.get_mut(key) {
            Some(mut entry) if !entry.expired() => {
                entry.bytes = value;
                if let Some(t) = ttl {
                    entry.expires_at = Some(Instant::now() + t);
                }
            }
            _ => {
                self.map.insert(key.to_string(), Entry::new(value, ttl));
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        if let Some(entry) = self.map.get(key) {
            if !entry.expired() {
                return Ok(entry.bytes.clone());
            }
        }
        self.map.remove_if(key, |_, e| e.expired());
        Err(GatewayError::NotFound(format!("key `{key}` not found")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn decrement_and_get(&self, key: &str) -> Result<i64> {
        // The entry guard holds the shard lock, making the
        // read-modify-write atomic with respect to other callers.
        let mut entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(b"0".to_vec(), None));
        if entry.expired() {
            *entry = Entry::new(b"0".to_vec(), None);
        }
        let next = parse_counter(key, &entry.bytes)? - 1;
        entry.bytes = next.to_string().into_bytes();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        match self.map.get_mut(key) {
            Some(mut entry) if !entry.expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let re = pattern_regex(pattern)?;
        Ok(self
            .map
            .iter()
            .filter(|e| !e.value().expired() && re.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", b"hello".to_vec(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("a", b"x".to_vec(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.get("a").await.is_ok());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn set_without_ttl_keeps_existing_expiry() {
        let store = MemoryStore::new();
        store
            .set("a", b"1".to_vec(), Some(Duration::from_millis(30)))
            .await
            .unwrap();
        store.set("a", b"2".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn decrement_counts_down_from_stored_value() {
        let store = MemoryStore::new();
        store.set("c", b"3".to_vec(), None).await.unwrap();
        assert_eq!(store.decrement_and_get("c").await.unwrap(), 2);
        assert_eq!(store.decrement_and_get("c").await.unwrap(), 1);
        assert_eq!(store.decrement_and_get("c").await.unwrap(), 0);
        assert_eq!(store.decrement_and_get("c").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn decrement_on_missing_key_starts_at_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.decrement_and_get("fresh").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn decrement_rejects_non_numeric_values() {
        let store = MemoryStore::new();
        store.set("c", b"abc".to_vec(), None).await.unwrap();
        assert!(store.decrement_and_get("c").await.is_err());
    }

    #[tokio::test]
    async fn expire_reports_missing_keys() {
        let store = MemoryStore::new();
        assert!(!store.expire("nope", Duration::from_secs(1)).await.unwrap());
        store.set("a", b"x".to_vec(), None).await.unwrap();
        assert!(store.expire("a", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn scan_matches_wildcard_patterns_only() {
        let store = MemoryStore::new();
        store.set("cache:a", b"1".to_vec(), None).await.unwrap();
        store.set("cache:b", b"2".to_vec(), None).await.unwrap();
        store.set("ratelimit:a", b"3".to_vec(), None).await.unwrap();
        let mut keys = store.scan_keys("cache:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, ["cache:a", "cache:b"]);
    }
}
