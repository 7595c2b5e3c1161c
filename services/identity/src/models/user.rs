//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    models::AppConnect,
    validation::{is_blank, sanitize_nickname},
};

/// Status value of an account that may log in
pub const STATUS_ENABLED: i32 = 1;

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub nick_name: Option<String>,
    pub real_name: Option<String>,
    pub user_mail: Option<String>,
    /// Encoded login password
    pub login_password: Option<String>,
    pub user_mobile: Option<String>,
    pub pic: Option<String>,
    pub user_regtime: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
    pub status: i32,
}

impl User {
    /// Build a fresh, enabled account from a provider link's profile snapshot
    pub fn from_app_connect(app_connect: &AppConnect, now: DateTime<Utc>) -> Self {
        Self {
            user_id: Uuid::new_v4().simple().to_string(),
            nick_name: Some(sanitize_nickname(app_connect.nick_name.as_deref())),
            real_name: None,
            user_mail: None,
            login_password: None,
            user_mobile: None,
            pic: app_connect.image_url.clone(),
            user_regtime: now,
            modify_time: now,
            status: STATUS_ENABLED,
        }
    }

    /// Real name when present, nickname otherwise
    pub fn display_name(&self) -> Option<String> {
        match self.real_name.as_deref() {
            Some(real_name) if !is_blank(real_name) => Some(real_name.to_string()),
            _ => self.nick_name.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == STATUS_ENABLED
    }
}
