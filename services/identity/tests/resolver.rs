//! Behaviour of the identity resolver against the in-memory backends

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use identity::{
    App, AppConnect, IdentityConfig, IdentityError, IdentityResolver, IdentityResult, LoginType,
    User,
    cache::{APP_CONNECT_CACHE, CacheStore, MemoryCacheStore, USER_CACHE, identity_key},
    lock::{LockProvider, MemoryLockProvider, link_lock_key},
    password::{Argon2PasswordEncoder, PasswordEncoder},
    repositories::{IdentityTransaction, MemoryIdentityStore, TransactionManager, UserStore},
};

struct Harness {
    store: MemoryIdentityStore,
    cache: Arc<MemoryCacheStore>,
    locks: Arc<MemoryLockProvider>,
    resolver: IdentityResolver,
}

fn harness() -> Harness {
    let store = MemoryIdentityStore::new();
    harness_with(store.clone(), Arc::new(store.clone()), Arc::new(store))
}

fn harness_with(
    store: MemoryIdentityStore,
    users: Arc<dyn UserStore>,
    transactions: Arc<dyn TransactionManager>,
) -> Harness {
    // Another test in this binary may have installed it already.
    let _ = common::telemetry::init_tracing("identity=debug");

    let cache = Arc::new(MemoryCacheStore::new());
    let locks = Arc::new(MemoryLockProvider::new());
    let resolver = IdentityResolver::new(
        users,
        Arc::new(store.clone()),
        transactions,
        Arc::new(Argon2PasswordEncoder::new()),
        locks.clone(),
        cache.clone(),
        &IdentityConfig::default(),
    );

    Harness {
        store,
        cache,
        locks,
        resolver,
    }
}

fn user(user_id: &str, nick_name: &str) -> User {
    User {
        user_id: user_id.to_string(),
        nick_name: Some(nick_name.to_string()),
        real_name: None,
        user_mail: None,
        login_password: None,
        user_mobile: None,
        pic: Some(format!("https://img.example.com/{}.png", user_id)),
        user_regtime: Utc::now(),
        modify_time: Utc::now(),
        status: 1,
    }
}

fn link(app_id: i32, biz_user_id: &str, user_id: &str) -> AppConnect {
    AppConnect {
        user_id: Some(user_id.to_string()),
        ..AppConnect::new(app_id, biz_user_id)
    }
}

fn incoming(app_id: i32, biz_user_id: &str, union_id: Option<&str>) -> AppConnect {
    AppConnect {
        nick_name: Some("Wei😄".to_string()),
        image_url: Some("https://wx.example.com/head.png".to_string()),
        biz_union_id: union_id.map(str::to_string),
        ..AppConnect::new(app_id, biz_user_id)
    }
}

#[tokio::test]
async fn test_blank_or_colonless_credentials_are_invalid() {
    let h = harness();

    for credential in ["", "   ", "abc123", "1abc123"] {
        let result = h.resolver.resolve_by_composite(credential).await;
        assert!(
            matches!(result, Err(IdentityError::InvalidCredential(_))),
            "{:?} was accepted",
            credential
        );
    }
}

#[tokio::test]
async fn test_malformed_composite_credentials_are_invalid() {
    let h = harness();

    for credential in ["99:abc123", "x:abc123", "1:", "1:  ", "1:abc:def"] {
        let result = h.resolver.resolve_by_composite(credential).await;
        assert!(
            matches!(result, Err(IdentityError::InvalidCredential(_))),
            "{:?} was accepted",
            credential
        );
    }
}

#[tokio::test]
async fn test_composite_credential_resolves_linked_user() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_app_connect(link(App::Mp.value(), "abc123", "u1"))?;

    let principal = h.resolver.resolve_by_composite("2:abc123").await?;

    assert_eq!(principal.user_id, "u1");
    assert_eq!(principal.biz_user_id.as_deref(), Some("abc123"));
    assert_eq!(principal.app_type, Some(2));
    assert_eq!(principal.pic.as_deref(), Some("https://img.example.com/u1.png"));
    assert!(principal.enabled);
    assert_eq!(principal.password, None);
    Ok(())
}

#[tokio::test]
async fn test_display_name_prefers_real_name() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_user(User {
        real_name: Some("Robert".to_string()),
        ..user("u2", "Bob")
    })?;
    h.store.seed_app_connect(link(1, "bob", "u1"))?;
    h.store.seed_app_connect(link(1, "robert", "u2"))?;

    let bob = h.resolver.resolve_by_app_and_biz_user_id(App::Mini, "bob").await?;
    let robert = h
        .resolver
        .resolve_by_app_and_biz_user_id(App::Mini, "robert")
        .await?;

    assert_eq!(bob.name.as_deref(), Some("Bob"));
    assert_eq!(robert.name.as_deref(), Some("Robert"));
    Ok(())
}

#[tokio::test]
async fn test_missing_link_is_user_not_found() {
    let h = harness();

    let result = h
        .resolver
        .resolve_by_app_and_biz_user_id(App::Mini, "nobody")
        .await;

    assert!(matches!(result, Err(IdentityError::UserNotFound(_))));
    assert!(!h.cache.contains(USER_CACHE, &identity_key(1, "nobody")));
}

#[tokio::test]
async fn test_disabled_user_resolves_as_disabled() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(User {
        status: 0,
        ..user("u1", "Bob")
    })?;
    h.store.seed_app_connect(link(1, "bob", "u1"))?;

    let principal = h.resolver.resolve_by_app_and_biz_user_id(App::Mini, "bob").await?;
    assert!(!principal.enabled);
    Ok(())
}

#[tokio::test]
async fn test_status_change_applies_to_next_resolve() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_app_connect(link(1, "bob", "u1"))?;

    let before = h.resolver.resolve_by_app_and_biz_user_id(App::Mini, "bob").await?;
    assert!(before.enabled);

    h.store.seed_user(User {
        status: 0,
        ..user("u1", "Bob")
    })?;

    let after = h.resolver.resolve_by_app_and_biz_user_id(App::Mini, "bob").await?;
    assert!(!after.enabled);
    Ok(())
}

#[tokio::test]
async fn test_resolve_ignores_user_cache_entries() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_app_connect(link(1, "bob", "u1"))?;
    h.cache.put(USER_CACHE, "1:bob", "not json", 60).await?;

    let principal = h.resolver.resolve_by_app_and_biz_user_id(App::Mini, "bob").await?;
    assert_eq!(principal.user_id, "u1");
    Ok(())
}

#[tokio::test]
async fn test_app_connect_lookup_is_cached() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_app_connect(link(1, "bob", "u1"))?;
    h.cache.put(APP_CONNECT_CACHE, "1:other", "not json", 60).await?;

    assert!(h.resolver.find_app_connect(1, "bob").await?.is_some());
    assert!(h.cache.contains(APP_CONNECT_CACHE, "1:bob"));
    assert!(h.resolver.find_app_connect(1, "other").await?.is_none());
    assert!(h.resolver.find_app_connect(1, "nobody").await?.is_none());
    assert!(!h.cache.contains(APP_CONNECT_CACHE, "1:nobody"));

    h.resolver.evict_identity(1, "bob").await;
    assert!(!h.cache.contains(APP_CONNECT_CACHE, "1:bob"));
    Ok(())
}

#[tokio::test]
async fn test_ensure_linked_user_registers_new_user() -> IdentityResult<()> {
    let h = harness();

    h.resolver.ensure_linked_user(incoming(1, "o-new", None)).await?;

    assert_eq!(h.store.user_count()?, 1);
    assert_eq!(h.store.app_connect_count()?, 1);

    let stored = h.resolver.find_app_connect(1, "o-new").await?.unwrap();
    let owner = stored.user_id.clone().unwrap();
    let user = h.store.get_by_id(&owner).await?.unwrap();

    assert_eq!(user.nick_name.as_deref(), Some("Wei:smile:"));
    assert_eq!(user.pic.as_deref(), Some("https://wx.example.com/head.png"));
    assert!(user.is_enabled());
    assert_eq!(user.user_regtime, user.modify_time);

    let principal = h.resolver.resolve_by_composite("1:o-new").await?;
    assert_eq!(principal.user_id, owner);
    Ok(())
}

#[tokio::test]
async fn test_ensure_linked_user_is_idempotent() -> IdentityResult<()> {
    let h = harness();

    h.resolver.ensure_linked_user(incoming(1, "o1", None)).await?;
    h.resolver.ensure_linked_user(incoming(1, "o1", None)).await?;

    assert_eq!(h.store.user_count()?, 1);
    assert_eq!(h.store.app_connect_count()?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_links_create_one_user() -> IdentityResult<()> {
    let h = harness();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let resolver = h.resolver.clone();
            tokio::spawn(async move { resolver.ensure_linked_user(incoming(1, "racer", None)).await })
        })
        .collect();

    for task in tasks {
        task.await.expect("link task panicked")?;
    }

    assert_eq!(h.store.user_count()?, 1);
    assert_eq!(h.store.app_connect_count()?, 1);
    Ok(())
}

#[tokio::test]
async fn test_union_id_reuses_existing_user() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_app_connect(AppConnect {
        biz_union_id: Some("union-1".to_string()),
        ..link(App::Mini.value(), "mini-openid", "u1")
    })?;

    h.resolver
        .ensure_linked_user(incoming(App::Mp.value(), "mp-openid", Some("union-1")))
        .await?;

    assert_eq!(h.store.user_count()?, 1);
    let links = h.store.app_connects_of("u1")?;
    assert_eq!(links.len(), 2);
    assert!(links.iter().any(|ac| ac.app_id == 2 && ac.biz_user_id == "mp-openid"));

    let principal = h.resolver.resolve_by_composite("2:mp-openid").await?;
    assert_eq!(principal.user_id, "u1");
    Ok(())
}

#[tokio::test]
async fn test_union_id_pointing_at_missing_user_registers_new_user() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_app_connect(AppConnect {
        biz_union_id: Some("union-1".to_string()),
        ..link(1, "orphan", "gone")
    })?;

    h.resolver
        .ensure_linked_user(incoming(2, "mp-openid", Some("union-1")))
        .await?;

    assert_eq!(h.store.user_count()?, 1);
    let stored = h.resolver.find_app_connect(2, "mp-openid").await?.unwrap();
    assert_ne!(stored.user_id.as_deref(), Some("gone"));
    Ok(())
}

#[tokio::test]
async fn test_blank_union_id_is_ignored() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(user("u1", "Bob"))?;
    h.store.seed_app_connect(AppConnect {
        biz_union_id: Some(" ".to_string()),
        ..link(1, "o1", "u1")
    })?;

    h.resolver.ensure_linked_user(incoming(2, "o2", Some(" "))).await?;

    assert_eq!(h.store.user_count()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_linking_evicts_both_caches() -> IdentityResult<()> {
    let h = harness();
    let key = identity_key(1, "o1");
    h.cache.put(USER_CACHE, &key, "stale", 60).await?;

    h.resolver.ensure_linked_user(incoming(1, "o1", None)).await?;

    assert!(!h.cache.contains(USER_CACHE, &key));
    assert!(!h.cache.contains(APP_CONNECT_CACHE, &key));
    Ok(())
}

/// Delegates everything but refuses to commit
struct FailingCommit {
    inner: MemoryIdentityStore,
}

struct FailingTransaction {
    inner: Box<dyn IdentityTransaction>,
}

#[async_trait]
impl TransactionManager for FailingCommit {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
        }))
    }
}

#[async_trait]
impl IdentityTransaction for FailingTransaction {
    async fn app_connect_by_biz_user_id(
        &mut self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>> {
        self.inner.app_connect_by_biz_user_id(biz_user_id, app_id).await
    }

    async fn user_id_by_union_id(&mut self, union_id: &str) -> IdentityResult<Option<String>> {
        self.inner.user_id_by_union_id(union_id).await
    }

    async fn user_by_id(&mut self, user_id: &str) -> IdentityResult<Option<User>> {
        self.inner.user_by_id(user_id).await
    }

    async fn insert_user(&mut self, user: &User) -> IdentityResult<()> {
        self.inner.insert_user(user).await
    }

    async fn insert_app_connect(&mut self, app_connect: &AppConnect) -> IdentityResult<()> {
        self.inner.insert_app_connect(app_connect).await
    }

    async fn commit(self: Box<Self>) -> IdentityResult<()> {
        Err(IdentityError::Conflict("commit refused".to_string()))
    }
}

#[tokio::test]
async fn test_failed_link_rolls_back_and_releases_lock() -> IdentityResult<()> {
    let store = MemoryIdentityStore::new();
    let h = harness_with(
        store.clone(),
        Arc::new(store.clone()),
        Arc::new(FailingCommit { inner: store }),
    );
    let key = identity_key(1, "o1");
    h.cache.put(USER_CACHE, &key, "cached", 60).await?;

    let result = h.resolver.ensure_linked_user(incoming(1, "o1", None)).await;

    assert!(matches!(result, Err(IdentityError::Conflict(_))));
    assert_eq!(h.store.user_count()?, 0);
    assert_eq!(h.store.app_connect_count()?, 0);
    assert!(h.cache.contains(USER_CACHE, &key));

    let relock =
        tokio::time::timeout(Duration::from_millis(100), h.locks.acquire(&link_lock_key(1, "o1")))
            .await;
    assert!(relock.is_ok(), "link lock was not released after failure");
    Ok(())
}

/// Never finishes opening a transaction
struct StalledBegin;

#[async_trait]
impl TransactionManager for StalledBegin {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_abandoned_link_frees_lock() -> IdentityResult<()> {
    let store = MemoryIdentityStore::new();
    let h = harness_with(store.clone(), Arc::new(store), Arc::new(StalledBegin));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        h.resolver.ensure_linked_user(incoming(1, "o1", None)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(h.locks.tracked_keys(), 0);

    let relock =
        tokio::time::timeout(Duration::from_millis(100), h.locks.acquire(&link_lock_key(1, "o1")))
            .await;
    assert!(relock.is_ok(), "link lock stayed held after the caller gave up");
    assert_eq!(h.store.user_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn test_email_password_login() -> IdentityResult<()> {
    let h = harness();
    let encoded = Argon2PasswordEncoder::new().encode("S3cret!pass")?;
    h.store.seed_user(User {
        user_mail: Some("bob@example.com".to_string()),
        login_password: Some(encoded),
        ..user("u1", "Bob")
    })?;
    h.store.seed_user(User {
        user_mail: Some("off@example.com".to_string()),
        login_password: Some(Argon2PasswordEncoder::new().encode("S3cret!pass")?),
        status: 0,
        ..user("u2", "Off")
    })?;

    let principal = h
        .resolver
        .resolve_by_email_password("bob@example.com", "S3cret!pass")
        .await?;
    assert_eq!(principal.user_id, "u1");
    assert!(principal.enabled);
    assert_eq!(principal.name.as_deref(), Some("Bob"));
    assert_eq!(principal.password.as_deref(), Some("S3cret!pass"));

    let disabled = h
        .resolver
        .resolve_by_email_password("off@example.com", "S3cret!pass")
        .await?;
    assert!(!disabled.enabled);
    Ok(())
}

#[tokio::test]
async fn test_email_password_failures_are_user_not_found() -> IdentityResult<()> {
    let h = harness();
    h.store.seed_user(User {
        user_mail: Some("bob@example.com".to_string()),
        login_password: Some(Argon2PasswordEncoder::new().encode("S3cret!pass")?),
        ..user("u1", "Bob")
    })?;
    h.store.seed_user(User {
        user_mail: Some("nopass@example.com".to_string()),
        ..user("u2", "NoPass")
    })?;

    match h
        .resolver
        .resolve_by_email_password("bob@example.com", "wrong")
        .await
    {
        Err(IdentityError::UserNotFound(message)) => assert_eq!(message, "Wrong password"),
        other => panic!("unexpected result: {:?}", other),
    }

    match h
        .resolver
        .resolve_by_email_password("ghost@example.com", "S3cret!pass")
        .await
    {
        Err(IdentityError::UserNotFound(message)) => assert_eq!(message, "No such user"),
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(matches!(
        h.resolver
            .resolve_by_email_password("nopass@example.com", "")
            .await,
        Err(IdentityError::UserNotFound(_))
    ));
    Ok(())
}

/// Counts mobile lookups reaching the store
struct CountingUsers {
    inner: MemoryIdentityStore,
    mobile_queries: AtomicUsize,
}

#[async_trait]
impl UserStore for CountingUsers {
    async fn get_by_biz_user_id(
        &self,
        app_id: i32,
        biz_user_id: &str,
    ) -> IdentityResult<Option<User>> {
        UserStore::get_by_biz_user_id(&self.inner, app_id, biz_user_id).await
    }

    async fn get_by_email(&self, email: &str) -> IdentityResult<Option<User>> {
        self.inner.get_by_email(email).await
    }

    async fn get_by_mobile(&self, mobile: &str) -> IdentityResult<Option<User>> {
        self.mobile_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_mobile(mobile).await
    }

    async fn get_by_id(&self, user_id: &str) -> IdentityResult<Option<User>> {
        self.inner.get_by_id(user_id).await
    }
}

#[tokio::test]
async fn test_find_by_mobile_or_username() -> IdentityResult<()> {
    let store = MemoryIdentityStore::new();
    let users = Arc::new(CountingUsers {
        inner: store.clone(),
        mobile_queries: AtomicUsize::new(0),
    });
    let h = harness_with(store.clone(), users.clone(), Arc::new(store));
    h.store.seed_user(User {
        user_mobile: Some("13800000000".to_string()),
        ..user("u1", "Bob")
    })?;
    let password = LoginType::Password.value();

    let found = h
        .resolver
        .find_by_mobile_or_username("13800000000", password)
        .await?;
    assert_eq!(found.map(|u| u.user_id), Some("u1".to_string()));
    assert_eq!(users.mobile_queries.load(Ordering::SeqCst), 1);

    let absent = h
        .resolver
        .find_by_mobile_or_username("not-a-phone", password)
        .await?;
    assert!(absent.is_none());
    assert_eq!(users.mobile_queries.load(Ordering::SeqCst), 1);

    let sms = h
        .resolver
        .find_by_mobile_or_username("not-a-phone", LoginType::Sms.value())
        .await?;
    assert!(sms.is_none());
    assert_eq!(users.mobile_queries.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_to_principal_copies_stored_hash() {
    let h = harness();
    let user = User {
        real_name: Some("Robert".to_string()),
        login_password: Some("$argon2id$v=19$stored".to_string()),
        ..user("u1", "Bob")
    };

    let principal = h.resolver.to_principal(1, &user, "openid");

    assert_eq!(principal.user_id, "u1");
    assert_eq!(principal.biz_user_id.as_deref(), Some("openid"));
    assert_eq!(principal.app_type, Some(1));
    assert_eq!(principal.name.as_deref(), Some("Robert"));
    assert_eq!(principal.password.as_deref(), Some("$argon2id$v=19$stored"));
    assert!(principal.enabled);
}
