use crate::db::models::{
    Category, Feature, Property, PropertyAsset, PropertyDetail, PublicUser,
};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

const PROPERTY_COLUMNS: &str = "id, owner_id, category_id, title, description, listing_type, status, price, \
     address, city, country, latitude, longitude, bedrooms, bathrooms, area, max_guests, created_at, updated_at";

/// Column values for an insert. Assets and feature links travel separately.
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub owner_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub listing_type: String,
    pub price: f64,
    pub address: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub area: Option<f64>,
    pub max_guests: Option<i32>,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct PropertyChanges {
    pub category_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub listing_type: Option<String>,
    pub status: Option<String>,
    pub price: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<f64>,
    pub max_guests: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub url: String,
    pub asset_type: &'static str,
}

impl DbOperations {
    pub async fn get_property(&self, id: Uuid) -> Result<Option<Property>, AppError> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1");
        let property = sqlx::query_as::<_, Property>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(property)
    }

    pub async fn require_property(&self, id: Uuid) -> Result<Property, AppError> {
        self.get_property(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Property not found".into()))
    }

    pub async fn get_property_detail(&self, id: Uuid) -> Result<Option<PropertyDetail>, AppError> {
        let Some(property) = self.get_property(id).await? else {
            return Ok(None);
        };

        let category = match property.category_id {
            Some(category_id) => {
                sqlx::query_as::<_, Category>(
                    "SELECT id, name, description, created_at FROM categories WHERE id = $1",
                )
                .bind(category_id)
                .fetch_optional(self.pool.as_ref())
                .await?
            }
            None => None,
        };

        let owner = sqlx::query_as::<_, PublicUser>(
            "SELECT id, name, avatar, created_at FROM users WHERE id = $1",
        )
        .bind(property.owner_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let assets = self.get_property_assets(id).await?;
        let (images, videos): (Vec<_>, Vec<_>) =
            assets.into_iter().partition(|a| a.asset_type == "image");

        let features = sqlx::query_as::<_, Feature>(
            "SELECT f.id, f.name, f.icon, f.created_at FROM features f \
             JOIN property_features pf ON pf.feature_id = f.id \
             WHERE pf.property_id = $1 ORDER BY f.name",
        )
        .bind(id)
        .fetch_all(self.pool.as_ref())
        .await?;

        let (average_rating, review_count): (Option<f64>, i64) = sqlx::query_as(
            "SELECT AVG(rating)::float8, COUNT(*) FROM reviews WHERE property_id = $1",
        )
        .bind(id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Some(PropertyDetail {
            property,
            category,
            owner,
            images,
            videos,
            features,
            average_rating,
            review_count,
        }))
    }

    pub async fn get_property_assets(&self, property_id: Uuid) -> Result<Vec<PropertyAsset>, AppError> {
        let assets = sqlx::query_as::<_, PropertyAsset>(
            "SELECT id, property_id, url, asset_type, position FROM property_assets \
             WHERE property_id = $1 ORDER BY asset_type, position",
        )
        .bind(property_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(assets)
    }

    async fn insert_assets(
        transaction: &mut Transaction<'_, Postgres>,
        property_id: Uuid,
        assets: &[NewAsset],
    ) -> Result<(), AppError> {
        for (position, asset) in assets.iter().enumerate() {
            sqlx::query(
                "INSERT INTO property_assets (id, property_id, url, asset_type, position) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(property_id)
            .bind(&asset.url)
            .bind(asset.asset_type)
            .bind(position as i32)
            .execute(&mut **transaction)
            .await?;
        }
        Ok(())
    }

    async fn insert_feature_links(
        transaction: &mut Transaction<'_, Postgres>,
        property_id: Uuid,
        feature_ids: &[Uuid],
    ) -> Result<(), AppError> {
        for feature_id in feature_ids {
            sqlx::query(
                "INSERT INTO property_features (property_id, feature_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(property_id)
            .bind(feature_id)
            .execute(&mut **transaction)
            .await?;
        }
        Ok(())
    }

    async fn create_property_with_transaction(
        &self,
        property: &NewProperty,
        assets: &[NewAsset],
        feature_ids: &[Uuid],
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Property, AppError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO properties (id, owner_id, category_id, title, description, listing_type, status, price, \
             address, city, country, latitude, longitude, bedrooms, bathrooms, area, max_guests, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'available', $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17) \
             RETURNING {PROPERTY_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Property>(&sql)
            .bind(Uuid::new_v4())
            .bind(property.owner_id)
            .bind(property.category_id)
            .bind(&property.title)
            .bind(&property.description)
            .bind(&property.listing_type)
            .bind(property.price)
            .bind(&property.address)
            .bind(&property.city)
            .bind(&property.country)
            .bind(property.latitude)
            .bind(property.longitude)
            .bind(property.bedrooms)
            .bind(property.bathrooms)
            .bind(property.area)
            .bind(property.max_guests)
            .bind(now)
            .fetch_one(&mut **transaction)
            .await?;

        Self::insert_assets(transaction, created.id, assets).await?;
        Self::insert_feature_links(transaction, created.id, feature_ids).await?;

        Ok(created)
    }

    /// Inserts the listing, its assets and feature links atomically.
    pub async fn create_property(
        &self,
        property: &NewProperty,
        assets: &[NewAsset],
        feature_ids: &[Uuid],
    ) -> Result<Property, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = self
            .create_property_with_transaction(property, assets, feature_ids, &mut transaction)
            .await;

        match result {
            Ok(property) => {
                transaction.commit().await?;
                Ok(property)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    async fn update_property_with_transaction(
        &self,
        id: Uuid,
        changes: &PropertyChanges,
        images: Option<&[NewAsset]>,
        feature_ids: Option<&[Uuid]>,
        transaction: &mut Transaction<'_, Postgres>,
    ) -> Result<Property, AppError> {
        let sql = format!(
            "UPDATE properties SET \
             category_id = COALESCE($2, category_id), title = COALESCE($3, title), \
             description = COALESCE($4, description), listing_type = COALESCE($5, listing_type), \
             status = COALESCE($6, status), price = COALESCE($7, price), address = COALESCE($8, address), \
             city = COALESCE($9, city), country = COALESCE($10, country), latitude = COALESCE($11, latitude), \
             longitude = COALESCE($12, longitude), bedrooms = COALESCE($13, bedrooms), \
             bathrooms = COALESCE($14, bathrooms), area = COALESCE($15, area), \
             max_guests = COALESCE($16, max_guests), updated_at = $17 \
             WHERE id = $1 RETURNING {PROPERTY_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Property>(&sql)
            .bind(id)
            .bind(changes.category_id)
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(&changes.listing_type)
            .bind(&changes.status)
            .bind(changes.price)
            .bind(&changes.address)
            .bind(&changes.city)
            .bind(&changes.country)
            .bind(changes.latitude)
            .bind(changes.longitude)
            .bind(changes.bedrooms)
            .bind(changes.bathrooms)
            .bind(changes.area)
            .bind(changes.max_guests)
            .bind(Utc::now())
            .fetch_optional(&mut **transaction)
            .await?
            .ok_or_else(|| AppError::NotFound("Property not found".into()))?;

        if let Some(images) = images {
            sqlx::query("DELETE FROM property_assets WHERE property_id = $1 AND asset_type = 'image'")
                .bind(id)
                .execute(&mut **transaction)
                .await?;
            Self::insert_assets(transaction, id, images).await?;
        }

        if let Some(feature_ids) = feature_ids {
            sqlx::query("DELETE FROM property_features WHERE property_id = $1")
                .bind(id)
                .execute(&mut **transaction)
                .await?;
            Self::insert_feature_links(transaction, id, feature_ids).await?;
        }

        Ok(updated)
    }

    pub async fn update_property(
        &self,
        id: Uuid,
        changes: &PropertyChanges,
        images: Option<&[NewAsset]>,
        feature_ids: Option<&[Uuid]>,
    ) -> Result<Property, AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = self
            .update_property_with_transaction(id, changes, images, feature_ids, &mut transaction)
            .await;

        match result {
            Ok(property) => {
                transaction.commit().await?;
                Ok(property)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    pub async fn delete_property(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_property_status(&self, id: Uuid, status: &str) -> Result<Property, AppError> {
        let sql = format!(
            "UPDATE properties SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {PROPERTY_COLUMNS}"
        );
        sqlx::query_as::<_, Property>(&sql)
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Property not found".into()))
    }

    pub async fn count_existing_features(&self, feature_ids: &[Uuid]) -> Result<i64, AppError> {
        if feature_ids.is_empty() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM features WHERE id = ANY($1)")
            .bind(feature_ids)
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }
}
