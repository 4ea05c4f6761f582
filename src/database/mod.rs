// 数据库模块
// 包含数据库实体定义和状态存储实现

use async_trait::async_trait;

use crate::presence::{ChatId, UserId, UserStatus};

pub mod models; // 数据库实体定义
pub mod repositories; // 存储实现

// 重新导出常用类型，方便其他模块使用
pub use models::status::UserStatusEntity;
pub use repositories::status::PgStatusRepository;

/// 服务端状态存储接口
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// 设置用户在线标记，用户不存在时返回 `Ok(None)`
    async fn set_online(
        &self,
        user_id: UserId,
        is_online: bool,
    ) -> Result<Option<UserStatus>, sqlx::Error>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<UserStatus>, sqlx::Error>;

    /// 按入群顺序返回聊天室成员状态
    async fn find_by_chat(&self, chat_id: ChatId) -> Result<Vec<UserStatus>, sqlx::Error>;
}
