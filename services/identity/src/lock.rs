//! Mutual exclusion around account linking

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use common::lock::{LockGuard, RedisLock};
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

use crate::error::{IdentityError, IdentityResult};

/// Name of the lock serialising link creation
pub const LINK_LOCK_NAME: &str = "insertUser";

/// Lock key serialising link creation for one provider account
pub fn link_lock_key(app_id: i32, biz_user_id: &str) -> String {
    format!("{}:{}:{}", LINK_LOCK_NAME, app_id, biz_user_id)
}

/// Hands out exclusive holds on string keys
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Wait until `key` is free and take it
    async fn acquire(&self, key: &str) -> IdentityResult<Box<dyn LockHandle>>;
}

/// A held lock. Dropping a handle without calling `release` still frees the
/// lock.
#[async_trait]
pub trait LockHandle: Send {
    fn key(&self) -> &str;

    async fn release(self: Box<Self>) -> IdentityResult<()>;
}

/// Distributed lock shared by every process talking to the same Redis
#[derive(Clone)]
pub struct RedisLockProvider {
    lock: RedisLock,
}

impl RedisLockProvider {
    pub fn new(lock: RedisLock) -> Self {
        Self { lock }
    }
}

#[async_trait]
impl LockProvider for RedisLockProvider {
    async fn acquire(&self, key: &str) -> IdentityResult<Box<dyn LockHandle>> {
        let guard = self.lock.acquire(key).await?;
        Ok(Box::new(RedisLockHandle {
            key: key.to_string(),
            lock: self.lock.clone(),
            guard: Some(guard),
        }))
    }
}

struct RedisLockHandle {
    key: String,
    lock: RedisLock,
    /// `None` once released
    guard: Option<LockGuard>,
}

#[async_trait]
impl LockHandle for RedisLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> IdentityResult<()> {
        let mut handle = self;
        if let Some(guard) = handle.guard.take() {
            handle.lock.release(guard).await?;
        }
        Ok(())
    }
}

impl Drop for RedisLockHandle {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        // Dropped mid-flight, e.g. by a caller's timeout.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lock = self.lock.clone();
                runtime.spawn(async move {
                    let key = guard.key().to_string();
                    if let Err(e) = lock.release(guard).await {
                        warn!("Failed to release abandoned lock {}: {}", key, e);
                    }
                });
            }
            Err(_) => warn!(
                "Lock {} abandoned outside a runtime, it frees when its lease expires",
                self.key
            ),
        }
    }
}

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Per-key async mutexes, valid within one process. Keys nobody holds or
/// waits for are forgotten.
#[derive(Debug, Default)]
pub struct MemoryLockProvider {
    locks: LockTable,
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held or waited on
    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn acquire(&self, key: &str) -> IdentityResult<Box<dyn LockHandle>> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))?;
            locks.entry(key.to_string()).or_default().clone()
        };

        let guard = mutex.lock_owned().await;
        Ok(Box::new(MemoryLockHandle {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }))
    }
}

struct MemoryLockHandle {
    key: String,
    locks: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl LockHandle for MemoryLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> IdentityResult<()> {
        Ok(())
    }
}

impl Drop for MemoryLockHandle {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Acquirers clone the entry under the table lock, so a count of one
        // here means nobody else holds or awaits this key.
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(&self.key)
                .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
            {
                locks.remove(&self.key);
            }
        }
    }
}
