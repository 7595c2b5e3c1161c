//! Persistence seams for users and provider links
//!
//! Reads go straight through [`UserStore`] and [`AppConnectStore`]. Linking a
//! provider account must be atomic, so it runs on an [`IdentityTransaction`]
//! opened by a [`TransactionManager`]. A transaction dropped without
//! [`IdentityTransaction::commit`] is rolled back.

use async_trait::async_trait;

use crate::{
    error::IdentityResult,
    models::{AppConnect, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityRepository;

/// Read access to users
#[async_trait]
pub trait UserStore: Send + Sync {
    /// User owning the link `(app_id, biz_user_id)`
    async fn get_by_biz_user_id(
        &self,
        app_id: i32,
        biz_user_id: &str,
    ) -> IdentityResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> IdentityResult<Option<User>>;

    async fn get_by_mobile(&self, mobile: &str) -> IdentityResult<Option<User>>;

    async fn get_by_id(&self, user_id: &str) -> IdentityResult<Option<User>>;
}

/// Read access to provider links
#[async_trait]
pub trait AppConnectStore: Send + Sync {
    async fn get_by_biz_user_id(
        &self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>>;

    /// Owner of any link carrying this union id
    async fn get_user_id_by_union_id(&self, union_id: &str) -> IdentityResult<Option<String>>;
}

/// Opens write transactions
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>>;
}

/// Reads and writes sharing one atomic scope
#[async_trait]
pub trait IdentityTransaction: Send {
    async fn app_connect_by_biz_user_id(
        &mut self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>>;

    async fn user_id_by_union_id(&mut self, union_id: &str) -> IdentityResult<Option<String>>;

    async fn user_by_id(&mut self, user_id: &str) -> IdentityResult<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> IdentityResult<()>;

    async fn insert_app_connect(&mut self, app_connect: &AppConnect) -> IdentityResult<()>;

    async fn commit(self: Box<Self>) -> IdentityResult<()>;
}
