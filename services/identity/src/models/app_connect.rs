//! Third-party account link

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Links one provider account to one internal user.
///
/// At most one row exists per `(app_id, biz_user_id)`. Rows sharing a
/// `biz_union_id` all point at the same user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AppConnect {
    /// Surrogate key, assigned by the store on insert
    pub id: Option<i64>,
    /// Owning internal user, set when the link is persisted
    pub user_id: Option<String>,
    pub app_id: i32,
    pub nick_name: Option<String>,
    pub image_url: Option<String>,
    pub biz_user_id: String,
    pub biz_union_id: Option<String>,
    pub temp_uid: Option<String>,
    pub biz_temp_session: Option<String>,
}

impl AppConnect {
    /// An unlinked provider account with no profile snapshot
    pub fn new(app_id: i32, biz_user_id: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: None,
            app_id,
            nick_name: None,
            image_url: None,
            biz_user_id: biz_user_id.into(),
            biz_union_id: None,
            temp_uid: None,
            biz_temp_session: None,
        }
    }
}
