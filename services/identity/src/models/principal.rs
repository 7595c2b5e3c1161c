//! Authentication result handed back to callers

use serde::{Deserialize, Serialize};

use crate::{app::App, models::User};

/// Short-lived authenticated identity. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub enabled: bool,
    pub name: Option<String>,
    pub pic: Option<String>,
}

impl Principal {
    /// Principal for a provider login; carries no password
    pub fn for_app(user: &User, app: App, biz_user_id: &str) -> Self {
        Self {
            user_id: user.user_id.clone(),
            biz_user_id: Some(biz_user_id.to_string()),
            app_type: Some(app.value()),
            password: None,
            enabled: user.is_enabled(),
            name: user.display_name(),
            pic: user.pic.clone(),
        }
    }

    /// Principal for an email/password login.
    ///
    /// Carries the submitted password, not the stored hash.
    pub fn for_password(user: &User, submitted_password: &str) -> Self {
        Self {
            user_id: user.user_id.clone(),
            biz_user_id: None,
            app_type: None,
            password: Some(submitted_password.to_string()),
            enabled: user.is_enabled(),
            name: user.display_name(),
            pic: user.pic.clone(),
        }
    }

    /// Full mapping of a user row, stored password hash included
    pub fn from_user(app_id: i32, user: &User, biz_user_id: &str) -> Self {
        Self {
            user_id: user.user_id.clone(),
            biz_user_id: Some(biz_user_id.to_string()),
            app_type: Some(app_id),
            password: user.login_password.clone(),
            enabled: user.is_enabled(),
            name: user.display_name(),
            pic: user.pic.clone(),
        }
    }
}
