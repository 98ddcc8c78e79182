use crate::db::models::{Category, CategoryWithCount, Feature};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use uuid::Uuid;

impl DbOperations {
    pub async fn list_categories(&self) -> Result<Vec<CategoryWithCount>, AppError> {
        let categories = sqlx::query_as::<_, CategoryWithCount>(
            "SELECT c.id, c.name, c.description, c.created_at, COUNT(p.id) AS property_count \
             FROM categories c LEFT JOIN properties p ON p.category_id = c.id \
             GROUP BY c.id ORDER BY c.name",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(categories)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Option<Category>, AppError> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(category)
    }

    pub async fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category, AppError> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, description, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Category, AppError> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = COALESCE($2, name), description = COALESCE($3, description) \
             WHERE id = $1 RETURNING id, name, description, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))
    }

    pub async fn delete_category(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_features(&self) -> Result<Vec<Feature>, AppError> {
        let features = sqlx::query_as::<_, Feature>(
            "SELECT id, name, icon, created_at FROM features ORDER BY name",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(features)
    }

    pub async fn create_feature(&self, name: &str, icon: Option<&str>) -> Result<Feature, AppError> {
        let feature = sqlx::query_as::<_, Feature>(
            "INSERT INTO features (id, name, icon, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, icon, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(icon)
        .bind(Utc::now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(feature)
    }

    pub async fn update_feature(
        &self,
        id: Uuid,
        name: Option<&str>,
        icon: Option<&str>,
    ) -> Result<Feature, AppError> {
        sqlx::query_as::<_, Feature>(
            "UPDATE features SET name = COALESCE($2, name), icon = COALESCE($3, icon) \
             WHERE id = $1 RETURNING id, name, icon, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(icon)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Feature not found".into()))
    }

    pub async fn delete_feature(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
