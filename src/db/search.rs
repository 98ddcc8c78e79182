//! Dynamic listing filters.
//!
//! Every list/search endpoint funnels into [`PropertyFilter`], which appends
//! predicates to a `QueryBuilder` so user input is always bound as a
//! positional parameter, never spliced into the SQL text.

use crate::db::models::{ListingType, PropertyStatus, PropertySummary};
use crate::db::operations::DbOperations;
use crate::error::AppError;
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const MAX_RADIUS_KM: f64 = 500.0;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Rating,
    Distance,
}

impl SortOrder {
    fn order_by(&self, has_location: bool) -> &'static str {
        match self {
            SortOrder::Newest => " ORDER BY p.created_at DESC",
            SortOrder::Oldest => " ORDER BY p.created_at ASC",
            SortOrder::PriceAsc => " ORDER BY p.price ASC, p.created_at DESC",
            SortOrder::PriceDesc => " ORDER BY p.price DESC, p.created_at DESC",
            SortOrder::Rating => " ORDER BY average_rating DESC NULLS LAST, p.created_at DESC",
            SortOrder::Distance if has_location => " ORDER BY distance_km ASC",
            SortOrder::Distance => " ORDER BY p.created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64, radius_km: Option<f64>) -> Result<Self, AppError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::ValidationError(
                "Latitude must be within [-90, 90] and longitude within [-180, 180]".into(),
            ));
        }
        let radius_km = radius_km.unwrap_or(DEFAULT_RADIUS_KM);
        if !(radius_km > 0.0 && radius_km <= MAX_RADIUS_KM) {
            return Err(AppError::ValidationError(format!(
                "Radius must be between 0 and {} km",
                MAX_RADIUS_KM
            )));
        }
        Ok(Self { lat, lng, radius_km })
    }
}

pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        // Bounded so the offset always fits in an i64
        let page = page.filter(|p| *p >= 1).unwrap_or(1).min(MAX_PAGE);
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            total / self.limit + i64::from(total % self.limit != 0)
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    pub status: Option<PropertyStatus>,
    pub category_id: Option<Uuid>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_bedrooms: Option<i32>,
    pub city: Option<String>,
    pub keyword: Option<String>,
    pub owner_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub sort: SortOrder,
}

impl PropertyFilter {
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(AppError::ValidationError(
                    "min_price cannot be greater than max_price".into(),
                ));
            }
        }
        if self.min_price.map_or(false, |p| p < 0.0) || self.max_price.map_or(false, |p| p < 0.0) {
            return Err(AppError::ValidationError("Prices cannot be negative".into()));
        }
        Ok(())
    }

    /// Stable key for the listing cache.
    pub fn cache_key(&self, page: &Page) -> String {
        format!("properties:{:?}:{}:{}", self, page.page, page.limit)
    }

    fn push_distance_expr(qb: &mut QueryBuilder<'_, Postgres>, point: &GeoPoint) {
        // Haversine in SQL; LEAST guards acos against rounding just above 1.0
        qb.push("(")
            .push_bind(EARTH_RADIUS_KM)
            .push(" * acos(LEAST(1.0, cos(radians(")
            .push_bind(point.lat)
            .push(")) * cos(radians(p.latitude)) * cos(radians(p.longitude) - radians(")
            .push_bind(point.lng)
            .push(")) + sin(radians(")
            .push_bind(point.lat)
            .push(")) * sin(radians(p.latitude)))))");
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE 1 = 1");

        if let Some(status) = self.status {
            qb.push(" AND p.status = ").push_bind(status.as_str());
        }
        if let Some(category_id) = self.category_id {
            qb.push(" AND p.category_id = ").push_bind(category_id);
        }
        if let Some(listing_type) = self.listing_type {
            qb.push(" AND p.listing_type = ").push_bind(listing_type.as_str());
        }
        if let Some(min_price) = self.min_price {
            qb.push(" AND p.price >= ").push_bind(min_price);
        }
        if let Some(max_price) = self.max_price {
            qb.push(" AND p.price <= ").push_bind(max_price);
        }
        if let Some(bedrooms) = self.min_bedrooms {
            qb.push(" AND p.bedrooms >= ").push_bind(bedrooms);
        }
        if let Some(city) = self.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            qb.push(" AND p.city ILIKE ").push_bind(city.to_string());
        }
        if let Some(keyword) = self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let pattern = format!("%{}%", escape_like(keyword));
            qb.push(" AND (p.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.address ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.city ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(owner_id) = self.owner_id {
            qb.push(" AND p.owner_id = ").push_bind(owner_id);
        }
        if let Some(point) = &self.location {
            qb.push(" AND p.latitude IS NOT NULL AND p.longitude IS NOT NULL AND ");
            Self::push_distance_expr(qb, point);
            qb.push(" <= ").push_bind(point.radius_km);
        }
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM properties p");
        self.push_where(&mut qb);
        qb
    }

    pub fn select_query(&self, page: &Page) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(
            "SELECT p.id, p.owner_id, p.category_id, c.name AS category_name, p.title, \
             p.listing_type, p.status, p.price, p.city, p.country, p.latitude, p.longitude, \
             p.bedrooms, p.bathrooms, p.area, \
             (SELECT a.url FROM property_assets a WHERE a.property_id = p.id AND a.asset_type = 'image' \
              ORDER BY a.position ASC LIMIT 1) AS cover_image, \
             (SELECT AVG(r.rating)::float8 FROM reviews r WHERE r.property_id = p.id) AS average_rating, \
             (SELECT COUNT(*) FROM reviews r WHERE r.property_id = p.id) AS review_count, \
             p.created_at",
        );
        if let Some(point) = &self.location {
            qb.push(", ");
            Self::push_distance_expr(&mut qb, point);
            qb.push(" AS distance_km");
        }
        qb.push(" FROM properties p LEFT JOIN categories c ON c.id = p.category_id");
        self.push_where(&mut qb);
        qb.push(self.sort.order_by(self.location.is_some()));
        qb.push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        qb
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl DbOperations {
    pub async fn search_properties(
        &self,
        filter: &PropertyFilter,
        page: &Page,
    ) -> Result<(Vec<PropertySummary>, i64), AppError> {
        let total: i64 = filter
            .count_query()
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let rows = filter
            .select_query(page)
            .build_query_as::<PropertySummary>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_has_no_predicates() {
        let filter = PropertyFilter::default();
        let qb = filter.count_query();
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM properties p WHERE 1 = 1");
    }

    #[test]
    fn test_filters_bind_in_order() {
        let filter = PropertyFilter {
            status: Some(PropertyStatus::Available),
            listing_type: Some(ListingType::Rent),
            min_price: Some(100.0),
            max_price: Some(500.0),
            ..Default::default()
        };
        let qb = filter.count_query();
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM properties p WHERE 1 = 1 AND p.status = $1 \
             AND p.listing_type = $2 AND p.price >= $3 AND p.price <= $4"
        );
    }

    #[test]
    fn test_keyword_searches_all_text_columns() {
        let filter = PropertyFilter {
            keyword: Some("  loft ".to_string()),
            ..Default::default()
        };
        let sql = filter.count_query().sql().to_string();
        assert!(sql.contains("p.title ILIKE $1"));
        assert!(sql.contains("p.description ILIKE $2"));
        assert!(sql.contains("p.address ILIKE $3"));
        assert!(sql.contains("p.city ILIKE $4"));
    }

    #[test]
    fn test_blank_keyword_is_ignored() {
        let filter = PropertyFilter {
            keyword: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!filter.count_query().sql().contains("ILIKE"));
    }

    #[test]
    fn test_location_adds_distance_column_and_radius() {
        let filter = PropertyFilter {
            location: Some(GeoPoint::new(48.85, 2.35, Some(5.0)).unwrap()),
            sort: SortOrder::Distance,
            ..Default::default()
        };
        let sql = filter.select_query(&Page::default()).sql().to_string();
        assert!(sql.contains("AS distance_km"));
        assert!(sql.contains("acos(LEAST(1.0"));
        assert!(sql.contains("ORDER BY distance_km ASC"));
        assert!(sql.trim_end().ends_with("LIMIT $10 OFFSET $11"));
    }

    #[test]
    fn test_distance_sort_without_location_falls_back() {
        let filter = PropertyFilter {
            sort: SortOrder::Distance,
            ..Default::default()
        };
        let sql = filter.select_query(&Page::default()).sql().to_string();
        assert!(sql.contains("ORDER BY p.created_at DESC"));
        assert!(!sql.contains("distance_km"));
    }

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(91.0, 0.0, None).is_err());
        assert!(GeoPoint::new(0.0, -181.0, None).is_err());
        assert!(GeoPoint::new(0.0, 0.0, Some(0.0)).is_err());
        assert!(GeoPoint::new(0.0, 0.0, Some(MAX_RADIUS_KM + 1.0)).is_err());
        let point = GeoPoint::new(10.0, 20.0, None).unwrap();
        assert_eq!(point.radius_km, DEFAULT_RADIUS_KM);
    }

    #[test]
    fn test_price_range_validation() {
        let filter = PropertyFilter {
            min_price: Some(500.0),
            max_price: Some(100.0),
            ..Default::default()
        };
        assert!(filter.validate().is_err());

        let filter = PropertyFilter {
            min_price: Some(-1.0),
            ..Default::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_pagination() {
        let page = Page::new(Some(3), Some(20));
        assert_eq!(page.offset(), 40);
        assert_eq!(page.total_pages(41), 3);
        assert_eq!(page.total_pages(40), 2);
        assert_eq!(page.total_pages(0), 0);

        let page = Page::new(Some(0), Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_huge_page_is_clamped() {
        let page = Page::new(Some(i64::MAX), Some(MAX_PAGE_SIZE));
        assert_eq!(page.page, MAX_PAGE);
        assert!(page.offset() >= 0);

        let page = Page::new(Some(i64::MAX), None);
        assert!(page.offset() > 0);
        assert_eq!(page.total_pages(i64::MAX), i64::MAX / DEFAULT_PAGE_SIZE + 1);
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
