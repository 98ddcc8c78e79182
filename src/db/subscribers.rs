use crate::db::models::Subscriber;
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

impl DbOperations {
    pub async fn get_subscriber(&self, email: &str) -> Result<Option<Subscriber>, AppError> {
        let subscriber = sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, created_at FROM subscribers WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(subscriber)
    }

    pub async fn create_subscriber(&self, email: &str) -> Result<Subscriber, AppError> {
        let subscriber = sqlx::query_as::<_, Subscriber>(
            "INSERT INTO subscribers (id, email, created_at) VALUES ($1, $2, $3) \
             RETURNING id, email, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(subscriber)
    }

    pub async fn delete_subscriber(&self, email: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM subscribers WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_subscribers(&self, limit: i64, offset: i64) -> Result<(Vec<Subscriber>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
            .fetch_one(self.pool.as_ref())
            .await?;

        let subscribers = sqlx::query_as::<_, Subscriber>(
            "SELECT id, email, created_at FROM subscribers ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok((subscribers, total))
    }
}
