use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

// 私信内容长度上限，与标准档心情消息一致
pub const PRIVATE_MESSAGE_LIMIT: usize = 2000;

// 缓存相关常量
const CONVERSATION_CACHE_PREFIX: &str = "pm:conv:"; // 会话缓存前缀
const CONVERSATION_CACHE_EXPIRE: u64 = 300; // 会话缓存过期时间，单位秒
const DEFAULT_CONVERSATION_LIMIT: i64 = 50;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct PrivateMessage {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub peer_id: String,
    pub limit: Option<i64>,
}

// 会话缓存键对双方排序，两个方向的读取命中同一份缓存
fn conversation_cache_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}{}:{}", CONVERSATION_CACHE_PREFIX, a, b)
    } else {
        format!("{}{}:{}", CONVERSATION_CACHE_PREFIX, b, a)
    }
}

impl PrivateMessage {
    pub async fn send(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        let message_id = Uuid::new_v4().to_string();

        let message = sqlx::query_as::<_, PrivateMessage>(
            r#"
            INSERT INTO private_messages (message_id, sender_id, recipient_id, content, is_read, created_at)
            VALUES ($1, $2, $3, $4, FALSE, NOW())
            RETURNING message_id, sender_id, recipient_id, content, is_read, created_at
            "#,
        )
        .bind(&message_id)
        .bind(sender_id)
        .bind(recipient_id)
        .bind(content)
        .fetch_one(pool)
        .await?;

        // 发送新私信后，清除该会话的缓存
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = conversation_cache_key(sender_id, recipient_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }

        Ok(message)
    }

    // 读取与某个用户的会话，按时间倒序。
    // 缓存命中意味着上次读取后没有新消息，未读标记无需再更新；
    // 对方发送新消息会使缓存失效，未命中路径先标记已读再查询
    pub async fn conversation(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        user_id: &str,
        peer_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT).clamp(1, 100);

        let cacheable = limit <= DEFAULT_CONVERSATION_LIMIT;
        let cache_key = conversation_cache_key(user_id, peer_id);

        if cacheable {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
                if let Ok(json_str) = cached {
                    if let Ok(messages) = serde_json::from_str::<Vec<PrivateMessage>>(&json_str) {
                        tracing::debug!("Get conversation from cache: {}", cache_key);
                        return Ok(messages);
                    }
                }
            }
        }

        // 对方发给自己的消息标记为已读
        sqlx::query(
            r#"
            UPDATE private_messages
            SET is_read = TRUE
            WHERE recipient_id = $1 AND sender_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .bind(peer_id)
        .execute(pool)
        .await?;

        let messages = sqlx::query_as::<_, PrivateMessage>(
            r#"
            SELECT message_id, sender_id, recipient_id, content, is_read, created_at
            FROM private_messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(peer_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        if cacheable {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(&messages) {
                    let _: Result<(), redis::RedisError> = conn
                        .set_ex(&cache_key, json_str, CONVERSATION_CACHE_EXPIRE)
                        .await;
                    tracing::debug!("Set conversation to cache: {}", cache_key);
                }
            }
        }

        Ok(messages)
    }

    pub async fn unread_count(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM private_messages
            WHERE recipient_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
