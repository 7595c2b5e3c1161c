//! Lookup caching and invalidation

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use common::cache::RedisPool;

use crate::error::{IdentityError, IdentityResult};

/// Cache of user lookups by provider account, shared with the rest of the shop
pub const USER_CACHE: &str = "yami_user";

/// Cache of provider links
pub const APP_CONNECT_CACHE: &str = "AppConnect";

/// Entry key shared by both identity caches
pub fn identity_key(app_id: i32, biz_user_id: &str) -> String {
    format!("{}:{}", app_id, biz_user_id)
}

/// Named caches holding string values
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, cache_name: &str, key: &str) -> IdentityResult<Option<String>>;

    async fn put(
        &self,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> IdentityResult<()>;

    async fn evict(&self, cache_name: &str, key: &str) -> IdentityResult<()>;
}

/// Redis cache; entries live at `<cache_name>::<key>`
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: RedisPool,
}

impl RedisCacheStore {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn redis_key(cache_name: &str, key: &str) -> String {
        format!("{}::{}", cache_name, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, cache_name: &str, key: &str) -> IdentityResult<Option<String>> {
        self.redis
            .get(&Self::redis_key(cache_name, key))
            .await
            .map_err(IdentityError::Cache)
    }

    async fn put(
        &self,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> IdentityResult<()> {
        self.redis
            .set(&Self::redis_key(cache_name, key), value, Some(ttl_seconds))
            .await
            .map_err(IdentityError::Cache)
    }

    async fn evict(&self, cache_name: &str, key: &str) -> IdentityResult<()> {
        self.redis
            .delete(&Self::redis_key(cache_name, key))
            .await
            .map(|_| ())
            .map_err(IdentityError::Cache)
    }
}

/// Process-local cache honouring TTLs
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<(String, String), (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists
    pub fn contains(&self, cache_name: &str, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(&(cache_name.to_string(), key.to_string()))
                    .is_some_and(|(_, expires)| *expires > Instant::now())
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, cache_name: &str, key: &str) -> IdentityResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))?;

        Ok(entries
            .get(&(cache_name.to_string(), key.to_string()))
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn put(
        &self,
        cache_name: &str,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> IdentityResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))?;

        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        entries.insert(
            (cache_name.to_string(), key.to_string()),
            (value.to_string(), expires),
        );
        Ok(())
    }

    async fn evict(&self, cache_name: &str, key: &str) -> IdentityResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))?;

        entries.remove(&(cache_name.to_string(), key.to_string()));
        Ok(())
    }
}
