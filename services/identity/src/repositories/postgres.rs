//! PostgreSQL-backed identity repository

use async_trait::async_trait;
use common::error::DatabaseError;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::{
    error::IdentityResult,
    models::{AppConnect, User},
    repositories::{AppConnectStore, IdentityTransaction, TransactionManager, UserStore},
};

const SELECT_USER: &str = r#"
    SELECT user_id, nick_name, real_name, user_mail, login_password, user_mobile, pic,
           user_regtime, modify_time, status
    FROM users
"#;

const SELECT_APP_CONNECT: &str = r#"
    SELECT id, user_id, app_id, nick_name, image_url, biz_user_id, biz_union_id,
           temp_uid, biz_temp_session
    FROM app_connects
    WHERE biz_user_id = $1 AND app_id = $2
"#;

const SELECT_USER_ID_BY_UNION_ID: &str = r#"
    SELECT user_id
    FROM app_connects
    WHERE biz_union_id = $1
    ORDER BY id
    LIMIT 1
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (user_id, nick_name, real_name, user_mail, login_password, user_mobile,
                       pic, user_regtime, modify_time, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

const INSERT_APP_CONNECT: &str = r#"
    INSERT INTO app_connects (user_id, app_id, nick_name, image_url, biz_user_id, biz_union_id,
                              temp_uid, biz_temp_session)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

/// Identity repository over a PostgreSQL pool
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    /// Create a new identity repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> IdentityResult<()> {
        info!("Running identity schema migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        Ok(())
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> IdentityResult<Option<User>> {
        let sql = format!("{} WHERE {} = $1", SELECT_USER, filter);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgIdentityRepository {
    async fn get_by_biz_user_id(
        &self,
        app_id: i32,
        biz_user_id: &str,
    ) -> IdentityResult<Option<User>> {
        debug!("Finding user by app {} and biz user id {}", app_id, biz_user_id);

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.user_id, u.nick_name, u.real_name, u.user_mail, u.login_password,
                   u.user_mobile, u.pic, u.user_regtime, u.modify_time, u.status
            FROM users u
            JOIN app_connects ac ON ac.user_id = u.user_id
            WHERE ac.app_id = $1 AND ac.biz_user_id = $2
            "#,
        )
        .bind(app_id)
        .bind(biz_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> IdentityResult<Option<User>> {
        debug!("Finding user by email: {}", email);
        self.fetch_user("user_mail", email).await
    }

    async fn get_by_mobile(&self, mobile: &str) -> IdentityResult<Option<User>> {
        debug!("Finding user by mobile: {}", mobile);
        self.fetch_user("user_mobile", mobile).await
    }

    async fn get_by_id(&self, user_id: &str) -> IdentityResult<Option<User>> {
        debug!("Finding user by ID: {}", user_id);
        self.fetch_user("user_id", user_id).await
    }
}

#[async_trait]
impl AppConnectStore for PgIdentityRepository {
    async fn get_by_biz_user_id(
        &self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>> {
        let app_connect = sqlx::query_as::<_, AppConnect>(SELECT_APP_CONNECT)
            .bind(biz_user_id)
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(app_connect)
    }

    async fn get_user_id_by_union_id(&self, union_id: &str) -> IdentityResult<Option<String>> {
        let user_id = sqlx::query_scalar::<_, String>(SELECT_USER_ID_BY_UNION_ID)
            .bind(union_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user_id)
    }
}

#[async_trait]
impl TransactionManager for PgIdentityRepository {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        let tx = self.pool.begin().await.map_err(DatabaseError::Transaction)?;
        Ok(Box::new(PgIdentityTransaction { tx }))
    }
}

/// Open PostgreSQL transaction; sqlx rolls it back on drop
pub struct PgIdentityTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IdentityTransaction for PgIdentityTransaction {
    async fn app_connect_by_biz_user_id(
        &mut self,
        biz_user_id: &str,
        app_id: i32,
    ) -> IdentityResult<Option<AppConnect>> {
        let app_connect = sqlx::query_as::<_, AppConnect>(SELECT_APP_CONNECT)
            .bind(biz_user_id)
            .bind(app_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(app_connect)
    }

    async fn user_id_by_union_id(&mut self, union_id: &str) -> IdentityResult<Option<String>> {
        let user_id = sqlx::query_scalar::<_, String>(SELECT_USER_ID_BY_UNION_ID)
            .bind(union_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(user_id)
    }

    async fn user_by_id(&mut self, user_id: &str) -> IdentityResult<Option<User>> {
        let sql = format!("{} WHERE user_id = $1", SELECT_USER);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(user)
    }

    async fn insert_user(&mut self, user: &User) -> IdentityResult<()> {
        info!("Creating new user: {}", user.user_id);

        sqlx::query(INSERT_USER)
            .bind(&user.user_id)
            .bind(&user.nick_name)
            .bind(&user.real_name)
            .bind(&user.user_mail)
            .bind(&user.login_password)
            .bind(&user.user_mobile)
            .bind(&user.pic)
            .bind(user.user_regtime)
            .bind(user.modify_time)
            .bind(user.status)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_app_connect(&mut self, app_connect: &AppConnect) -> IdentityResult<()> {
        info!(
            "Linking app {} biz user {} to user {:?}",
            app_connect.app_id, app_connect.biz_user_id, app_connect.user_id
        );

        sqlx::query(INSERT_APP_CONNECT)
            .bind(&app_connect.user_id)
            .bind(app_connect.app_id)
            .bind(&app_connect.nick_name)
            .bind(&app_connect.image_url)
            .bind(&app_connect.biz_user_id)
            .bind(&app_connect.biz_union_id)
            .bind(&app_connect.temp_uid)
            .bind(&app_connect.biz_temp_session)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> IdentityResult<()> {
        self.tx.commit().await.map_err(DatabaseError::Transaction)?;
        Ok(())
    }
}
