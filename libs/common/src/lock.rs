//! Distributed mutual exclusion on top of Redis
//!
//! A lock is a single key set with `SET NX PX`. The value is a random token
//! owned by the holder, so release only deletes the key while it still
//! carries that token. The lease bounds how long a crashed holder can keep
//! the key.

use std::time::{Duration, Instant};

use redis::Script;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    cache::RedisPool,
    error::{LockError, LockResult},
};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Timing knobs for [`RedisLock`]
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long the key lives if the holder never releases it
    pub lease: Duration,
    /// Upper bound on how long `acquire` keeps retrying
    pub wait_timeout: Duration,
    /// Pause between two acquisition attempts
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(50),
        }
    }
}

/// Proof of ownership for a held lock
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Redis-backed lock
#[derive(Clone)]
pub struct RedisLock {
    pool: RedisPool,
    options: LockOptions,
}

impl RedisLock {
    pub fn new(pool: RedisPool, options: LockOptions) -> Self {
        Self { pool, options }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Try once to take the lock; `None` when someone else holds it
    pub async fn try_acquire(&self, key: &str) -> LockResult<Option<LockGuard>> {
        let token = Uuid::new_v4().simple().to_string();
        let lease_ms = self.options.lease.as_millis() as u64;

        let mut conn = self.pool.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| LockGuard {
            key: key.to_string(),
            token,
        }))
    }

    /// Take the lock, retrying until `wait_timeout` has elapsed
    pub async fn acquire(&self, key: &str) -> LockResult<LockGuard> {
        let started = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire(key).await? {
                debug!("Acquired lock {}", key);
                return Ok(guard);
            }

            let waited = started.elapsed();
            if waited >= self.options.wait_timeout {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            tokio::time::sleep(self.options.retry_interval).await;
        }
    }

    /// Release a held lock. Returns false when the lease had already expired
    /// and the key no longer belonged to this guard.
    pub async fn release(&self, guard: LockGuard) -> LockResult<bool> {
        let mut conn = self.pool.connection().await?;
        let removed: i32 = Script::new(RELEASE_SCRIPT)
            .key(&guard.key)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!("Lock {} expired before it was released", guard.key);
        } else {
            debug!("Released lock {}", guard.key);
        }

        Ok(removed == 1)
    }
}
