use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::presence::UserStatus;

/// 用户在线状态数据库实体
///
/// 只持久化在线标记和最后在线时间，"最近在线"在读取时计算。
#[derive(Debug, Clone, FromRow)]
pub struct UserStatusEntity {
    pub user_id: i64,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl UserStatusEntity {
    pub fn into_status(self, now: DateTime<Utc>) -> UserStatus {
        UserStatus::new(self.user_id, self.is_online, self.last_seen, now)
    }
}
