use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RECENTLY_ONLINE_THRESHOLD;

pub type UserId = i64;
pub type ChatId = i64;

/// 用户在线状态
///
/// `is_recently_online` 由 `last_seen` 推导而来，读取时重新计算，不落库。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub is_recently_online: bool,
}

impl UserStatus {
    pub fn new(
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            is_online,
            last_seen,
            is_recently_online: is_recently_online(last_seen, now),
        }
    }

    /// 以 `now` 为基准重新计算 `is_recently_online`
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.is_recently_online = is_recently_online(self.last_seen, now);
        self
    }
}

pub fn is_recently_online(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    // 时钟回拨时 last_seen 可能晚于 now，按最近在线处理
    match (now - last_seen).to_std() {
        Ok(elapsed) => elapsed < RECENTLY_ONLINE_THRESHOLD,
        Err(_) => true,
    }
}
