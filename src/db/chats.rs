use crate::db::models::{Chat, ChatSummary, Message};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, is_read, created_at";

impl DbOperations {
    pub async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, AppError> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, property_id, buyer_id, owner_id, created_at FROM chats WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(chat)
    }

    /// Returns the existing chat for (property, buyer) or opens a new one.
    pub async fn find_or_create_chat(
        &self,
        property_id: Uuid,
        buyer_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Chat, AppError> {
        let chat = sqlx::query_as::<_, Chat>(
            "INSERT INTO chats (id, property_id, buyer_id, owner_id, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (property_id, buyer_id) DO UPDATE SET owner_id = EXCLUDED.owner_id \
             RETURNING id, property_id, buyer_id, owner_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(property_id)
        .bind(buyer_id)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(chat)
    }

    pub async fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<ChatSummary>, AppError> {
        let chats = sqlx::query_as::<_, ChatSummary>(
            "SELECT c.id, c.property_id, p.title AS property_title, c.buyer_id, c.owner_id, \
             u.id AS other_user_id, u.name AS other_user_name, u.avatar AS other_user_avatar, \
             lm.content AS last_message, lm.created_at AS last_message_at, \
             (SELECT COUNT(*) FROM messages m WHERE m.chat_id = c.id AND m.sender_id <> $1 AND NOT m.is_read) AS unread_count, \
             c.created_at \
             FROM chats c \
             LEFT JOIN properties p ON p.id = c.property_id \
             JOIN users u ON u.id = CASE WHEN c.buyer_id = $1 THEN c.owner_id ELSE c.buyer_id END \
             LEFT JOIN LATERAL (SELECT content, created_at FROM messages m WHERE m.chat_id = c.id \
                                ORDER BY m.created_at DESC LIMIT 1) lm ON TRUE \
             WHERE c.buyer_id = $1 OR c.owner_id = $1 \
             ORDER BY COALESCE(lm.created_at, c.created_at) DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(chats)
    }

    pub async fn insert_message(&self, chat_id: Uuid, sender_id: Uuid, content: &str) -> Result<Message, AppError> {
        let sql = format!(
            "INSERT INTO messages (id, chat_id, sender_id, content, is_read, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) RETURNING {MESSAGE_COLUMNS}"
        );
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(Uuid::new_v4())
            .bind(chat_id)
            .bind(sender_id)
            .bind(content)
            .bind(Utc::now())
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(message)
    }

    pub async fn list_messages(&self, chat_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Message>, AppError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 \
             ORDER BY created_at ASC LIMIT $2 OFFSET $3"
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(chat_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(messages)
    }

    pub async fn mark_chat_read(&self, chat_id: Uuid, reader_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE WHERE chat_id = $1 AND sender_id <> $2 AND NOT is_read",
        )
        .bind(chat_id)
        .bind(reader_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}
