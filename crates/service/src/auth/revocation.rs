//! Cache abstraction behind token blacklisting.
//!
//! Keys are `token:blacklist:<sha256 hex>` and `user:blacklist:<user id>`;
//! values are small strings and every entry carries its own TTL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::{future::Cache, Expiry};

use super::errors::AuthError;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Insert or overwrite `key`. A zero `ttl` is a no-op.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError>;
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
}

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store; enough for a single instance.
#[derive(Clone)]
pub struct MokaRevocationStore {
    cache: Cache<String, Entry>,
}

impl MokaRevocationStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MokaRevocationStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl RevocationStore for MokaRevocationStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.cache.insert(key.to_string(), Entry { value: value.to_string(), ttl }).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.cache.get(key).await.map(|e| e.value))
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisRevocationStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use redis::{aio::ConnectionManager, AsyncCommands};

    /// Shared store for multi-instance deployments.
    #[derive(Clone)]
    pub struct RedisRevocationStore {
        conn: ConnectionManager,
    }

    impl RedisRevocationStore {
        pub async fn connect(url: &str) -> Result<Self, AuthError> {
            let client = redis::Client::open(url).map_err(|e| AuthError::infra("redis client", e))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| AuthError::infra("redis connect", e))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl RevocationStore for RedisRevocationStore {
        async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
            let millis = ttl.as_millis() as u64;
            if millis == 0 {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(millis)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| AuthError::infra("redis SET", e))
        }

        async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
            let mut conn = self.conn.clone();
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(|e| AuthError::infra("redis GET", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = MokaRevocationStore::new(16);
        store.put("token:blacklist:abc", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("token:blacklist:abc").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("token:blacklist:def").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_individually() {
        let store = MokaRevocationStore::new(16);
        store.put("short", "1", Duration::from_millis(50)).await.unwrap();
        store.put("long", "1", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let store = MokaRevocationStore::new(16);
        store.put("user:blacklist:u", "10", Duration::from_secs(60)).await.unwrap();
        store.put("user:blacklist:u", "20", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("user:blacklist:u").await.unwrap().as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn zero_ttl_is_ignored() {
        let store = MokaRevocationStore::new(16);
        store.put("k", "1", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
