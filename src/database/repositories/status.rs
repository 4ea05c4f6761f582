use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::database::StatusRepository;
use crate::database::models::status::UserStatusEntity;
use crate::presence::{ChatId, UserId, UserStatus};

/// 基于 Postgres 的状态存储
#[derive(Clone)]
pub struct PgStatusRepository {
    pool: PgPool,
}

impl PgStatusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusRepository for PgStatusRepository {
    async fn set_online(
        &self,
        user_id: UserId,
        is_online: bool,
    ) -> Result<Option<UserStatus>, sqlx::Error> {
        // 状态变化或下线时刷新最后在线时间
        let entity = sqlx::query_as::<_, UserStatusEntity>(
            r#"
            UPDATE users
            SET last_seen = CASE
                    WHEN is_online <> $2 OR NOT $2 THEN NOW()
                    ELSE last_seen
                END,
                is_online = $2
            WHERE id = $1
            RETURNING id AS user_id, is_online, last_seen
            "#,
        )
        .bind(user_id)
        .bind(is_online)
        .fetch_optional(&self.pool)
        .await?;

        match &entity {
            Some(_) => tracing::debug!("User {} online status set to {}", user_id, is_online),
            None => tracing::warn!("Online status update for unknown user {}", user_id),
        }

        Ok(entity.map(|e| e.into_status(Utc::now())))
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<UserStatus>, sqlx::Error> {
        let entity = sqlx::query_as::<_, UserStatusEntity>(
            r#"
            SELECT id AS user_id, is_online, last_seen
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.into_status(Utc::now())))
    }

    async fn find_by_chat(&self, chat_id: ChatId) -> Result<Vec<UserStatus>, sqlx::Error> {
        let entities = sqlx::query_as::<_, UserStatusEntity>(
            r#"
            SELECT u.id AS user_id, u.is_online, u.last_seen
            FROM chat_members cm
            JOIN users u ON u.id = cm.user_id
            WHERE cm.chat_id = $1
            ORDER BY cm.joined_at, cm.user_id
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(entities.into_iter().map(|e| e.into_status(now)).collect())
    }
}
