use async_trait::async_trait;

use super::error::PresenceError;
use super::model::{ChatId, UserId, UserStatus};

/// 状态存储访问接口
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 更新当前登录用户的在线状态
    async fn update_online_status(&self, is_online: bool) -> Result<(), PresenceError>;

    /// 查询单个用户状态，用户不存在时返回 `Ok(None)`
    async fn get_user_status(&self, user_id: UserId) -> Result<Option<UserStatus>, PresenceError>;

    /// 查询聊天室全部成员的状态，按入群顺序排列
    async fn get_chat_users_status(&self, chat_id: ChatId)
    -> Result<Vec<UserStatus>, PresenceError>;
}

/// 尽力而为的状态投递通道
///
/// 调用立即返回，不等待结果，不重试，也不确认送达。
pub trait Beacon: Send + Sync {
    fn send_online_status(&self, is_online: bool);
}
