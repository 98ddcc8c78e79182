use crate::db::models::Notification;
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, kind, is_read, created_at";

/// A notification to write alongside another change.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub message: String,
}

impl NewNotification {
    pub fn new(user_id: Uuid, kind: &'static str, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
        }
    }
}

pub(crate) async fn insert_notification<'e, E>(executor: E, notification: &NewNotification) -> Result<Notification, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO notifications (id, user_id, title, message, kind, is_read, created_at) \
         VALUES ($1, $2, $3, $4, $5, FALSE, $6) RETURNING {NOTIFICATION_COLUMNS}"
    );
    let created = sqlx::query_as::<_, Notification>(&sql)
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

    Ok(created)
}

impl DbOperations {
    pub async fn create_notification(
        &self,
        user_id: Uuid,
        kind: &'static str,
        title: &str,
        message: &str,
    ) -> Result<Notification, AppError> {
        insert_notification(self.pool.as_ref(), &NewNotification::new(user_id, kind, title, message)).await
    }

    /// Page of notifications, total and unread counts.
    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64, i64), AppError> {
        let (total, unread): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT is_read) FROM notifications WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let notifications = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok((notifications, total, unread))
    }

    pub async fn count_unread_notifications(&self, user_id: Uuid) -> Result<i64, AppError> {
        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(unread)
    }

    /// Scoped to the recipient; another user's id simply matches nothing.
    pub async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification, AppError> {
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {NOTIFICATION_COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".into()))
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
