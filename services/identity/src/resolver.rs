//! Identity resolution: credentials in, principals out

use std::sync::Arc;

use chrono::Utc;
use common::{cache::RedisPool, lock::RedisLock};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::{
    app::{App, LoginType},
    cache::{APP_CONNECT_CACHE, CacheStore, RedisCacheStore, USER_CACHE, identity_key},
    config::IdentityConfig,
    error::{IdentityError, IdentityResult},
    lock::{LockProvider, RedisLockProvider, link_lock_key},
    models::{AppConnect, Principal, User},
    password::{Argon2PasswordEncoder, PasswordEncoder},
    repositories::{
        AppConnectStore, IdentityTransaction, PgIdentityRepository, TransactionManager, UserStore,
    },
    validation::{is_blank, is_mobile},
};

const NO_USER_INFO: &str = "Unable to load user information";

/// Resolves login credentials to principals and links provider accounts
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    app_connects: Arc<dyn AppConnectStore>,
    transactions: Arc<dyn TransactionManager>,
    passwords: Arc<dyn PasswordEncoder>,
    locks: Arc<dyn LockProvider>,
    cache: Arc<dyn CacheStore>,
    cache_ttl_seconds: u64,
}

impl IdentityResolver {
    pub fn new(
        users: Arc<dyn UserStore>,
        app_connects: Arc<dyn AppConnectStore>,
        transactions: Arc<dyn TransactionManager>,
        passwords: Arc<dyn PasswordEncoder>,
        locks: Arc<dyn LockProvider>,
        cache: Arc<dyn CacheStore>,
        config: &IdentityConfig,
    ) -> Self {
        Self {
            users,
            app_connects,
            transactions,
            passwords,
            locks,
            cache,
            cache_ttl_seconds: config.cache_ttl_seconds,
        }
    }

    /// Wire the PostgreSQL store, Redis cache and lock, and Argon2 encoder
    pub fn connect(pool: PgPool, redis: RedisPool, config: &IdentityConfig) -> Self {
        let repository = Arc::new(PgIdentityRepository::new(pool));
        let lock = RedisLock::new(redis.clone(), config.lock_options());

        Self::new(
            repository.clone(),
            repository.clone(),
            repository,
            Arc::new(Argon2PasswordEncoder::new()),
            Arc::new(RedisLockProvider::new(lock)),
            Arc::new(RedisCacheStore::new(redis)),
            config,
        )
    }

    /// Resolve an `"<appId>:<bizUserId>"` credential
    pub async fn resolve_by_composite(&self, credential: &str) -> IdentityResult<Principal> {
        if is_blank(credential) {
            return Err(IdentityError::InvalidCredential(NO_USER_INFO.to_string()));
        }
        let Some((app_segment, biz_user_id)) = credential.split_once(':') else {
            return Err(IdentityError::InvalidCredential(NO_USER_INFO.to_string()));
        };
        if is_blank(biz_user_id) || biz_user_id.contains(':') {
            return Err(IdentityError::InvalidCredential(format!(
                "Malformed biz user id in credential: {}",
                credential
            )));
        }

        let app_id: i32 = app_segment.parse().map_err(|_| {
            IdentityError::InvalidCredential(format!("Malformed app id: {}", app_segment))
        })?;
        let app = App::from_value(app_id)?;

        self.resolve_by_app_and_biz_user_id(app, biz_user_id).await
    }

    /// Resolve the user linked to a provider account.
    ///
    /// Always reads the user row, so status changes apply to the next login.
    pub async fn resolve_by_app_and_biz_user_id(
        &self,
        app: App,
        biz_user_id: &str,
    ) -> IdentityResult<Principal> {
        let user = self
            .users
            .get_by_biz_user_id(app.value(), biz_user_id)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound(NO_USER_INFO.to_string()))?;

        Ok(Principal::for_app(&user, app, biz_user_id))
    }

    /// The link for a provider account, if one exists
    pub async fn find_app_connect(
        &self,
        app_id: i32,
        biz_user_id: &str,
    ) -> IdentityResult<Option<AppConnect>> {
        let key = identity_key(app_id, biz_user_id);
        if let Some(app_connect) = self.cached::<AppConnect>(APP_CONNECT_CACHE, &key).await {
            return Ok(Some(app_connect));
        }

        let app_connect = self
            .app_connects
            .get_by_biz_user_id(biz_user_id, app_id)
            .await?;
        if let Some(app_connect) = &app_connect {
            self.store_cached(APP_CONNECT_CACHE, &key, app_connect).await;
        }

        Ok(app_connect)
    }

    /// Make sure the provider account is linked to an internal user,
    /// creating the user and the link on first sight.
    ///
    /// Runs under the per-account lock and inside one transaction. Both
    /// identity caches are evicted for the account once the transaction has
    /// finished. The lock is freed even when the returned future is dropped
    /// before completion.
    pub async fn ensure_linked_user(&self, app_connect: AppConnect) -> IdentityResult<()> {
        let app_id = app_connect.app_id;
        let biz_user_id = app_connect.biz_user_id.clone();

        if self.find_app_connect(app_id, &biz_user_id).await?.is_some() {
            return Ok(());
        }

        let lock = self.locks.acquire(&link_lock_key(app_id, &biz_user_id)).await?;

        let outcome = self.link_in_transaction(app_connect).await;
        if outcome.is_ok() {
            self.evict_identity(app_id, &biz_user_id).await;
        }

        let lock_key = lock.key().to_string();
        if let Err(e) = lock.release().await {
            warn!("Failed to release lock {}: {}", lock_key, e);
        }

        outcome
    }

    async fn link_in_transaction(&self, mut app_connect: AppConnect) -> IdentityResult<()> {
        let mut tx = self.transactions.begin().await?;

        if tx
            .app_connect_by_biz_user_id(&app_connect.biz_user_id, app_connect.app_id)
            .await?
            .is_some()
        {
            debug!(
                "App {} biz user {} was linked while waiting for the lock",
                app_connect.app_id, app_connect.biz_user_id
            );
            return Ok(());
        }

        let user_id = match self.union_user(tx.as_mut(), &app_connect).await? {
            Some(user) => {
                info!(
                    "Linking app {} biz user {} to existing user {} by union id",
                    app_connect.app_id, app_connect.biz_user_id, user.user_id
                );
                user.user_id
            }
            None => {
                let user = User::from_app_connect(&app_connect, Utc::now());
                tx.insert_user(&user).await?;
                info!(
                    "Registered user {} for app {} biz user {}",
                    user.user_id, app_connect.app_id, app_connect.biz_user_id
                );
                user.user_id
            }
        };

        app_connect.user_id = Some(user_id);
        tx.insert_app_connect(&app_connect).await?;
        tx.commit().await
    }

    /// Existing user already reachable through the link's union id
    async fn union_user(
        &self,
        tx: &mut dyn IdentityTransaction,
        app_connect: &AppConnect,
    ) -> IdentityResult<Option<User>> {
        let Some(union_id) = app_connect
            .biz_union_id
            .as_deref()
            .filter(|union_id| !is_blank(union_id))
        else {
            return Ok(None);
        };

        let Some(user_id) = tx
            .user_id_by_union_id(union_id)
            .await?
            .filter(|user_id| !is_blank(user_id))
        else {
            return Ok(None);
        };

        let user = tx.user_by_id(&user_id).await?;
        if user.is_none() {
            warn!(
                "Union id {} points at missing user {}, registering a new one",
                union_id, user_id
            );
        }
        Ok(user)
    }

    /// Email/password login
    pub async fn resolve_by_email_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<Principal> {
        let user = self
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| IdentityError::UserNotFound("No such user".to_string()))?;

        let matches = user
            .login_password
            .as_deref()
            .is_some_and(|encoded| self.passwords.matches(password, encoded));
        if !matches {
            debug!("Password mismatch for user {}", user.user_id);
            return Err(IdentityError::UserNotFound("Wrong password".to_string()));
        }

        Ok(Principal::for_password(&user, password))
    }

    /// Look up a user by mobile number.
    ///
    /// Only queried for SMS logins or mobile-shaped input; anything else
    /// yields `None` without touching the store.
    pub async fn find_by_mobile_or_username(
        &self,
        value: &str,
        login_type: i32,
    ) -> IdentityResult<Option<User>> {
        if login_type != LoginType::Sms.value() && !is_mobile(value) {
            return Ok(None);
        }

        self.users.get_by_mobile(value).await
    }

    pub fn to_principal(&self, app_id: i32, user: &User, biz_user_id: &str) -> Principal {
        Principal::from_user(app_id, user, biz_user_id)
    }

    /// Drop cached user and link entries for a provider account. Call after
    /// changing a linked user outside this resolver.
    pub async fn evict_identity(&self, app_id: i32, biz_user_id: &str) {
        let key = identity_key(app_id, biz_user_id);
        for cache_name in [USER_CACHE, APP_CONNECT_CACHE] {
            if let Err(e) = self.cache.evict(cache_name, &key).await {
                warn!("Failed to evict {} from {}: {}", key, cache_name, e);
            }
        }
    }

    async fn cached<T: DeserializeOwned>(&self, cache_name: &str, key: &str) -> Option<T> {
        let raw = match self.cache.get(cache_name, key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read of {} in {} failed: {}", key, cache_name, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable {} entry {}: {}", cache_name, key, e);
                None
            }
        }
    }

    async fn store_cached<T: Serialize + Sync>(&self, cache_name: &str, key: &str, value: &T) {
        let result = match serde_json::to_string(value) {
            Ok(raw) => {
                self.cache
                    .put(cache_name, key, &raw, self.cache_ttl_seconds)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            warn!("Cache write of {} in {} failed: {}", key, cache_name, e);
        }
    }
}
