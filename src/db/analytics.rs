//! Aggregate queries behind the dashboard and the admin analytics views.

use crate::db::models::{ReservationDetail, RESERVATION_CONFIRMED};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_MONTHS: i32 = 12;
pub const MAX_MONTHS: i32 = 36;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlatformOverview {
    pub total_users: i64,
    pub active_users: i64,
    pub total_properties: i64,
    pub available_properties: i64,
    pub total_reservations: i64,
    pub confirmed_reservations: i64,
    pub total_revenue: f64,
    pub total_reviews: i64,
    pub total_subscribers: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyRevenue {
    pub month: DateTime<Utc>,
    pub revenue: f64,
    pub reservations: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyCount {
    pub month: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryBreakdown {
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub property_count: i64,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopProperty {
    pub id: Uuid,
    pub title: String,
    pub city: String,
    pub price: f64,
    pub reservation_count: i64,
    pub revenue: f64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// What a host sees on their own dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct HostStats {
    pub total_listings: i64,
    pub listings_by_status: Vec<StatusCount>,
    pub total_bookings: i64,
    pub confirmed_earnings: f64,
    pub average_rating: Option<f64>,
    pub wishlist_saves: i64,
    pub unread_notifications: i64,
    pub recent_reservations: Vec<ReservationDetail>,
}

/// Clamps a `months` query parameter into `1..=MAX_MONTHS`.
pub fn clamp_months(months: Option<i32>) -> i32 {
    months.unwrap_or(DEFAULT_MONTHS).clamp(1, MAX_MONTHS)
}

impl DbOperations {
    pub async fn platform_overview(&self) -> Result<PlatformOverview, AppError> {
        let overview = sqlx::query_as::<_, PlatformOverview>(
            "SELECT \
             (SELECT COUNT(*) FROM users) AS total_users, \
             (SELECT COUNT(*) FROM users WHERE is_active) AS active_users, \
             (SELECT COUNT(*) FROM properties) AS total_properties, \
             (SELECT COUNT(*) FROM properties WHERE status = 'available') AS available_properties, \
             (SELECT COUNT(*) FROM reservations) AS total_reservations, \
             (SELECT COUNT(*) FROM reservations WHERE status = $1) AS confirmed_reservations, \
             (SELECT COALESCE(SUM(total_price), 0)::float8 FROM reservations WHERE status = $1) AS total_revenue, \
             (SELECT COUNT(*) FROM reviews) AS total_reviews, \
             (SELECT COUNT(*) FROM subscribers) AS total_subscribers",
        )
        .bind(RESERVATION_CONFIRMED)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(overview)
    }

    pub async fn monthly_revenue(&self, months: i32) -> Result<Vec<MonthlyRevenue>, AppError> {
        let rows = sqlx::query_as::<_, MonthlyRevenue>(
            "SELECT date_trunc('month', created_at) AS month, \
             COALESCE(SUM(total_price), 0)::float8 AS revenue, COUNT(*) AS reservations \
             FROM reservations \
             WHERE status = $1 AND created_at >= date_trunc('month', NOW()) - make_interval(months => $2 - 1) \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(RESERVATION_CONFIRMED)
        .bind(months)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    pub async fn user_growth(&self, months: i32) -> Result<Vec<MonthlyCount>, AppError> {
        let rows = sqlx::query_as::<_, MonthlyCount>(
            "SELECT date_trunc('month', created_at) AS month, COUNT(*) AS count \
             FROM users \
             WHERE created_at >= date_trunc('month', NOW()) - make_interval(months => $1 - 1) \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(months)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    pub async fn category_breakdown(&self) -> Result<Vec<CategoryBreakdown>, AppError> {
        let rows = sqlx::query_as::<_, CategoryBreakdown>(
            "SELECT c.id AS category_id, c.name AS category_name, COUNT(p.id) AS property_count, \
             AVG(p.price)::float8 AS average_price \
             FROM categories c LEFT JOIN properties p ON p.category_id = c.id \
             GROUP BY c.id, c.name ORDER BY property_count DESC, c.name",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    pub async fn top_properties(&self, limit: i64) -> Result<Vec<TopProperty>, AppError> {
        let rows = sqlx::query_as::<_, TopProperty>(
            "SELECT p.id, p.title, p.city, p.price, \
             COUNT(r.id) AS reservation_count, \
             COALESCE(SUM(r.total_price), 0)::float8 AS revenue, \
             (SELECT AVG(rv.rating)::float8 FROM reviews rv WHERE rv.property_id = p.id) AS average_rating \
             FROM properties p \
             LEFT JOIN reservations r ON r.property_id = p.id AND r.status = $1 \
             GROUP BY p.id \
             ORDER BY reservation_count DESC, average_rating DESC NULLS LAST, p.created_at DESC \
             LIMIT $2",
        )
        .bind(RESERVATION_CONFIRMED)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    pub async fn host_stats(&self, owner_id: Uuid) -> Result<HostStats, AppError> {
        let listings_by_status = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM properties WHERE owner_id = $1 GROUP BY status ORDER BY status",
        )
        .bind(owner_id)
        .fetch_all(self.pool.as_ref())
        .await?;
        let total_listings = listings_by_status.iter().map(|s| s.count).sum();

        let (total_bookings, confirmed_earnings): (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(r.total_price) FILTER (WHERE r.status = $2), 0)::float8 \
             FROM reservations r JOIN properties p ON p.id = r.property_id WHERE p.owner_id = $1",
        )
        .bind(owner_id)
        .bind(RESERVATION_CONFIRMED)
        .fetch_one(self.pool.as_ref())
        .await?;

        let average_rating: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(rv.rating)::float8 FROM reviews rv JOIN properties p ON p.id = rv.property_id \
             WHERE p.owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let wishlist_saves: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM wishlists w JOIN properties p ON p.id = w.property_id WHERE p.owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let unread_notifications = self.count_unread_notifications(owner_id).await?;
        let recent_reservations = self.list_reservations_for_owner(owner_id, 5).await?;

        Ok(HostStats {
            total_listings,
            listings_by_status,
            total_bookings,
            confirmed_earnings,
            average_rating,
            wishlist_saves,
            unread_notifications,
            recent_reservations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_months() {
        assert_eq!(clamp_months(None), 12);
        assert_eq!(clamp_months(Some(0)), 1);
        assert_eq!(clamp_months(Some(-4)), 1);
        assert_eq!(clamp_months(Some(6)), 6);
        assert_eq!(clamp_months(Some(120)), 36);
    }
}
