use crate::db::models::PropertySummary;
use crate::db::operations::DbOperations;
use crate::error::AppError;
use uuid::Uuid;

impl DbOperations {
    /// Flips membership and returns whether the property is now saved.
    pub async fn toggle_wishlist(&self, user_id: Uuid, property_id: Uuid) -> Result<bool, AppError> {
        let removed = sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND property_id = $2")
            .bind(user_id)
            .bind(property_id)
            .execute(self.pool.as_ref())
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO wishlists (user_id, property_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(property_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(true)
    }

    pub async fn is_in_wishlist(&self, user_id: Uuid, property_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM wishlists WHERE user_id = $1 AND property_id = $2)",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    pub async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<PropertySummary>, AppError> {
        let properties = sqlx::query_as::<_, PropertySummary>(
            "SELECT p.id, p.owner_id, p.category_id, c.name AS category_name, p.title, \
             p.listing_type, p.status, p.price, p.city, p.country, p.latitude, p.longitude, \
             p.bedrooms, p.bathrooms, p.area, \
             (SELECT a.url FROM property_assets a WHERE a.property_id = p.id AND a.asset_type = 'image' \
              ORDER BY a.position ASC LIMIT 1) AS cover_image, \
             (SELECT AVG(r.rating)::float8 FROM reviews r WHERE r.property_id = p.id) AS average_rating, \
             (SELECT COUNT(*) FROM reviews r WHERE r.property_id = p.id) AS review_count, \
             p.created_at \
             FROM wishlists w JOIN properties p ON p.id = w.property_id \
             LEFT JOIN categories c ON c.id = p.category_id \
             WHERE w.user_id = $1 ORDER BY w.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(properties)
    }
}
