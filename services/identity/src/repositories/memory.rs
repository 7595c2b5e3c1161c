//! In-memory identity store (for testing and single-process mode)

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;

use crate::{
    error::{IdentityError, IdentityResult},
    models::{AppConnect, User},
    repositories::{AppConnectStore, IdentityTransaction, TransactionManager, UserStore},
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, User>,
    app_connects: Vec<AppConnect>,
    next_app_connect_id: i64,
}

impl MemoryState {
    fn app_connect(&self, biz_user_id: &str, app_id: i32) -> Option<&AppConnect> {
        self.app_connects
            .iter()
            .find(|ac| ac.app_id == app_id && ac.biz_user_id == biz_user_id)
    }

    fn user_id_by_union_id(&self, union_id: &str) -> Option<String> {
        self.app_connects
            .iter()
            .find(|ac| ac.biz_union_id.as_deref() == Some(union_id))
            .and_then(|ac| ac.user_id.clone())
    }
}

/// Identity store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryIdentityStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> IdentityResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> IdentityResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| IdentityError::Store(format!("Lock poisoned: {}", e)))
    }

    /// Insert a user outside of any transaction
    pub fn seed_user(&self, user: User) -> IdentityResult<()> {
        self.write()?.users.insert(user.user_id.clone(), user);
        Ok(())
    }

    /// Insert a link outside of any transaction
    pub fn seed_app_connect(&self, mut app_connect: AppConnect) -> IdentityResult<()> {
        let mut state = self.write()?;
        state.next_app_connect_id += 1;
        app_connect.id = Some(state.next_app_connect_id);
        state.app_connects.push(app_connect);
        Ok(())
    }

    pub fn user_count(&self) -> IdentityResult<usize> {
        Ok(self.read()?.users.len())
    }

    pub fn app_connect_count(&self) -> IdentityResult<usize> {
        Ok(self.read()?.app_connects.len())
    }

    /// All links owned by a user, in insertion order
    pub fn app_connects_of(&self, user_id: &str) -> IdentityResult<Vec<AppConnect>> {
        Ok(self
            .read()?
            .app_connects
            .iter()
            .filter(|ac| ac.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryIdentityStore {
    async fn get_by_biz_user_id(
        &self,
        app_id: i32,
        biz_user_id: &str,
    ) -> IdentityResult<Option<User>> {
        let state = self.read()?;
        Ok(state
            .app_connect(biz_user_id, app_id)
            .and_then(|ac| ac.user_id.as_deref())
            .and_then(|user_id| state.users.get(user_id))
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> IdentityResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.user_mail.as_deref() == Some(email))
            .cloned())
    }

    async fn get_by_mobile(&self, mobile: &str) -> IdentityResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.user_mobile.as_deref() == Some(mobile))
            .cloned())
    }

    async fn get_by_id(&self, user_id: &str) -> IdentityResult<Option<User>> {
        Ok(self.read()?.users.get(user_id).cloned())
    }
}

#[async_trait]
impl AppConnectStore for MemoryIdentityStore {
    async fn get_by_biz_user_id(
        &self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>> {
        Ok(self.read()?.app_connect(biz_user_id, app_id).cloned())
    }

    async fn get_user_id_by_union_id(&self, union_id: &str) -> IdentityResult<Option<String>> {
        Ok(self.read()?.user_id_by_union_id(union_id))
    }
}

#[async_trait]
impl TransactionManager for MemoryIdentityStore {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            users: Vec::new(),
            app_connects: Vec::new(),
        }))
    }
}

/// Buffers writes until commit; dropping it discards them
struct MemoryTransaction {
    store: MemoryIdentityStore,
    users: Vec<User>,
    app_connects: Vec<AppConnect>,
}

#[async_trait]
impl IdentityTransaction for MemoryTransaction {
    async fn app_connect_by_biz_user_id(
        &mut self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>> {
        if let Some(pending) = self
            .app_connects
            .iter()
            .find(|ac| ac.app_id == app_id && ac.biz_user_id == biz_user_id)
        {
            return Ok(Some(pending.clone()));
        }
        Ok(self.store.read()?.app_connect(biz_user_id, app_id).cloned())
    }

    async fn user_id_by_union_id(&mut self, union_id: &str) -> IdentityResult<Option<String>> {
        if let Some(user_id) = self
            .app_connects
            .iter()
            .find(|ac| ac.biz_union_id.as_deref() == Some(union_id))
            .and_then(|ac| ac.user_id.clone())
        {
            return Ok(Some(user_id));
        }
        Ok(self.store.read()?.user_id_by_union_id(union_id))
    }

    async fn user_by_id(&mut self, user_id: &str) -> IdentityResult<Option<User>> {
        if let Some(pending) = self.users.iter().find(|u| u.user_id == user_id) {
            return Ok(Some(pending.clone()));
        }
        Ok(self.store.read()?.users.get(user_id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> IdentityResult<()> {
        self.users.push(user.clone());
        Ok(())
    }

    async fn insert_app_connect(&mut self, app_connect: &AppConnect) -> IdentityResult<()> {
        self.app_connects.push(app_connect.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> IdentityResult<()> {
        let MemoryTransaction {
            store,
            users,
            app_connects,
        } = *self;
        let mut state = store.write()?;

        for user in &users {
            if state.users.contains_key(&user.user_id) {
                return Err(IdentityError::Conflict(format!(
                    "User {} already exists",
                    user.user_id
                )));
            }
        }
        for app_connect in &app_connects {
            if state
                .app_connect(&app_connect.biz_user_id, app_connect.app_id)
                .is_some()
            {
                return Err(IdentityError::Conflict(format!(
                    "App {} biz user {} is already linked",
                    app_connect.app_id, app_connect.biz_user_id
                )));
            }
        }

        for user in users {
            state.users.insert(user.user_id.clone(), user);
        }
        for mut app_connect in app_connects {
            state.next_app_connect_id += 1;
            app_connect.id = Some(state.next_app_connect_id);
            state.app_connects.push(app_connect);
        }

        Ok(())
    }
}
