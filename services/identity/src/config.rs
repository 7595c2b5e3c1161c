//! Identity service configuration

use std::time::Duration;

use common::lock::LockOptions;
use config::{Config, Environment};
use serde::Deserialize;

use crate::error::IdentityResult;

/// Tunables for caching and the link lock
///
/// # Environment Variables
/// - `IDENTITY_CACHE_TTL_SECONDS`: lifetime of cached lookups (default: 3600)
/// - `IDENTITY_LOCK_LEASE_MS`: lease of the link lock (default: 30000)
/// - `IDENTITY_LOCK_WAIT_TIMEOUT_MS`: how long to wait for the link lock (default: 10000)
/// - `IDENTITY_LOCK_RETRY_INTERVAL_MS`: pause between lock attempts (default: 50)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    pub cache_ttl_seconds: u64,
    pub lock_lease_ms: u64,
    pub lock_wait_timeout_ms: u64,
    pub lock_retry_interval_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
            lock_lease_ms: 30_000,
            lock_wait_timeout_ms: 10_000,
            lock_retry_interval_ms: 50,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> IdentityResult<Self> {
        let defaults = Self::default();

        let config = Config::builder()
            .set_default("cache_ttl_seconds", defaults.cache_ttl_seconds)?
            .set_default("lock_lease_ms", defaults.lock_lease_ms)?
            .set_default("lock_wait_timeout_ms", defaults.lock_wait_timeout_ms)?
            .set_default("lock_retry_interval_ms", defaults.lock_retry_interval_ms)?
            .add_source(Environment::with_prefix("IDENTITY").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            lease: Duration::from_millis(self.lock_lease_ms),
            wait_timeout: Duration::from_millis(self.lock_wait_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_interval_ms),
        }
    }
}
