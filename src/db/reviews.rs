use crate::db::models::{Review, ReviewWithAuthor};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

const REVIEW_COLUMNS: &str = "id, property_id, user_id, rating, comment, created_at";

impl DbOperations {
    pub async fn get_review(&self, id: Uuid) -> Result<Option<Review>, AppError> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let review = sqlx::query_as::<_, Review>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(review)
    }

    pub async fn has_reviewed(&self, user_id: Uuid, property_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE user_id = $1 AND property_id = $2)",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    pub async fn create_review(
        &self,
        property_id: Uuid,
        user_id: Uuid,
        rating: i16,
        comment: &str,
    ) -> Result<Review, AppError> {
        let sql = format!(
            "INSERT INTO reviews (id, property_id, user_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {REVIEW_COLUMNS}"
        );
        let review = sqlx::query_as::<_, Review>(&sql)
            .bind(Uuid::new_v4())
            .bind(property_id)
            .bind(user_id)
            .bind(rating)
            .bind(comment)
            .bind(Utc::now())
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(review)
    }

    pub async fn update_review(
        &self,
        id: Uuid,
        rating: Option<i16>,
        comment: Option<&str>,
    ) -> Result<Review, AppError> {
        let sql = format!(
            "UPDATE reviews SET rating = COALESCE($2, rating), comment = COALESCE($3, comment) \
             WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        );
        sqlx::query_as::<_, Review>(&sql)
            .bind(id)
            .bind(rating)
            .bind(comment)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Review not found".into()))
    }

    pub async fn delete_review(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Page of reviews plus the total count and the listing's average rating.
    pub async fn list_reviews_for_property(
        &self,
        property_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReviewWithAuthor>, i64, Option<f64>), AppError> {
        let (total, average): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(rating)::float8 FROM reviews WHERE property_id = $1",
        )
        .bind(property_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let reviews = sqlx::query_as::<_, ReviewWithAuthor>(
            "SELECT r.id, r.property_id, r.user_id, u.name AS author_name, u.avatar AS author_avatar, \
             r.rating, r.comment, r.created_at \
             FROM reviews r JOIN users u ON u.id = r.user_id \
             WHERE r.property_id = $1 ORDER BY r.created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(property_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok((reviews, total, average))
    }
}
