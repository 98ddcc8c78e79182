use crate::api::{non_blank, response};
use crate::auth::extractor::AuthenticatedUser;
use crate::db::models::{ListingType, PropertyStatus, PropertySummary};
use crate::db::properties::{NewAsset, NewProperty, PropertyChanges};
use crate::db::search::{GeoPoint, Page, PropertyFilter, SortOrder};
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_IMAGES: usize = 6;
pub const LISTING_CACHE_PREFIX: &str = "properties:";
const UPLOAD_FOLDER: &str = "estatehub";

/// Query string accepted by the list, search and nearby endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub listing_type: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub city: Option<String>,
    pub keyword: Option<String>,
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
    pub sort: Option<SortOrder>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListingQuery {
    pub fn to_filter(&self) -> Result<(PropertyFilter, Page), AppError> {
        let status = match non_blank(self.status.as_deref()) {
            Some(s) => Some(
                PropertyStatus::parse(s)
                    .ok_or_else(|| AppError::ValidationError(format!("Unknown status: {}", s)))?,
            ),
            None => None,
        };
        let listing_type = match non_blank(self.listing_type.as_deref()) {
            Some(t) => Some(
                ListingType::parse(t)
                    .ok_or_else(|| AppError::ValidationError(format!("Unknown listing type: {}", t)))?,
            ),
            None => None,
        };

        let filter = PropertyFilter {
            status,
            category_id: self.category,
            listing_type,
            min_price: self.min_price,
            max_price: self.max_price,
            min_bedrooms: self.bedrooms,
            city: non_blank(self.city.as_deref()).map(str::to_string),
            keyword: non_blank(self.keyword.as_deref()).map(str::to_string),
            owner_id: None,
            location: None,
            sort: self.sort.unwrap_or_default(),
        };
        filter.validate()?;

        Ok((filter, Page::new(self.page, self.limit)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedListingPage {
    rows: Vec<PropertySummary>,
    total: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub listing_type: String,
    pub price: f64,
    #[serde(default)]
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub bedrooms: i32,
    #[serde(default)]
    pub bathrooms: i32,
    pub area: Option<f64>,
    pub max_guests: Option<i32>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub features: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePropertyRequest {
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
    pub category_id: Option<Uuid>,
    pub images: Option<Vec<String>>,
    pub features: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct UploadSignature {
    pub cloud_name: String,
    pub api_key: String,
    pub folder: String,
    pub timestamp: i64,
    pub signature: String,
    pub signature_algorithm: &'static str,
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    if latitude.map_or(false, |lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(AppError::ValidationError("Latitude must be within [-90, 90]".into()));
    }
    if longitude.map_or(false, |lng| !(-180.0..=180.0).contains(&lng)) {
        return Err(AppError::ValidationError("Longitude must be within [-180, 180]".into()));
    }
    Ok(())
}

/// Drops blank entries and rejects sets smaller than [`MIN_IMAGES`].
fn validate_images(images: &[String]) -> Result<Vec<String>, AppError> {
    let images: Vec<String> = images
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();
    if images.len() < MIN_IMAGES {
        return Err(AppError::ValidationError(format!(
            "At least {} images are required",
            MIN_IMAGES
        )));
    }
    Ok(images)
}

fn validate_price(price: f64) -> Result<(), AppError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::ValidationError("Price must be greater than 0".into()));
    }
    Ok(())
}

fn validate_listing_type(value: &str) -> Result<ListingType, AppError> {
    ListingType::parse(value.trim())
        .ok_or_else(|| AppError::ValidationError("listing_type must be 'rent' or 'sale'".into()))
}

pub fn validate_new_property(req: &CreatePropertyRequest) -> Result<Vec<String>, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::ValidationError("Title is required".into()));
    }
    if req.city.trim().is_empty() {
        return Err(AppError::ValidationError("City is required".into()));
    }
    validate_price(req.price)?;
    validate_listing_type(&req.listing_type)?;
    validate_coordinates(req.latitude, req.longitude)?;
    if req.bedrooms < 0 || req.bathrooms < 0 {
        return Err(AppError::ValidationError("Room counts cannot be negative".into()));
    }
    validate_images(&req.images)
}

fn assets(images: &[String], videos: &[String]) -> Vec<NewAsset> {
    images
        .iter()
        .map(|url| NewAsset {
            url: url.clone(),
            asset_type: "image",
        })
        .chain(videos.iter().map(|url| url.trim()).filter(|url| !url.is_empty()).map(|url| NewAsset {
            url: url.to_string(),
            asset_type: "video",
        }))
        .collect()
}

fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

async fn check_references(state: &AppState, category_id: Option<Uuid>, feature_ids: &[Uuid]) -> Result<(), AppError> {
    if let Some(category_id) = category_id {
        if state.db.get_category(category_id).await?.is_none() {
            return Err(AppError::ValidationError("Category does not exist".into()));
        }
    }
    if !feature_ids.is_empty() && state.db.count_existing_features(feature_ids).await? != feature_ids.len() as i64 {
        return Err(AppError::ValidationError("One or more features do not exist".into()));
    }
    Ok(())
}

async fn invalidate_listings(state: &AppState) {
    state.cache.invalidate_prefix(LISTING_CACHE_PREFIX).await;
    state.cache.invalidate_prefix(crate::api::categories::CATEGORY_CACHE_KEY).await;
}

/// Cloudinary signs the alphabetically sorted params followed by the secret.
pub fn sign_upload(folder: &str, timestamp: i64, api_secret: &str) -> String {
    let to_sign = format!("folder={}&timestamp={}{}", folder, timestamp, api_secret);
    format!("{:x}", Sha256::digest(to_sign.as_bytes()))
}

async fn run_search(state: &AppState, filter: &PropertyFilter, page: &Page) -> Result<HttpResponse, AppError> {
    let key = filter.cache_key(page);
    if let Some(cached) = state.cache.get::<CachedListingPage>(&key).await {
        return Ok(response::paginated(cached.rows, page, cached.total));
    }

    let (rows, total) = state.db.search_properties(filter, page).await?;
    let cached = CachedListingPage { rows, total };
    state.cache.set(&key, &cached).await;
    Ok(response::paginated(cached.rows, page, cached.total))
}

pub async fn list_properties(
    query: web::Query<ListingQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (filter, page) = query.to_filter()?;
    run_search(&state, &filter, &page).await
}

pub async fn search_properties(
    query: web::Query<ListingQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let keyword = non_blank(query.q.as_deref())
        .or_else(|| non_blank(query.keyword.as_deref()))
        .ok_or_else(|| AppError::ValidationError("Search query 'q' is required".into()))?
        .to_string();

    let (mut filter, page) = query.to_filter()?;
    filter.keyword = Some(keyword);
    run_search(&state, &filter, &page).await
}

pub async fn nearby_properties(
    query: web::Query<ListingQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (lat, lng) = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err(AppError::ValidationError("lat and lng are required".into())),
    };
    let point = GeoPoint::new(lat, lng, query.radius)?;

    let (mut filter, page) = query.to_filter()?;
    filter.location = Some(point);
    if query.sort.is_none() {
        filter.sort = SortOrder::Distance;
    }
    run_search(&state, &filter, &page).await
}

pub async fn get_property(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let detail = state
        .db
        .get_property_detail(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".into()))?;
    Ok(response::ok(detail))
}

pub async fn my_properties(
    user: AuthenticatedUser,
    query: web::Query<crate::api::PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let filter = PropertyFilter {
        owner_id: Some(user.id),
        ..Default::default()
    };
    let (rows, total) = state.db.search_properties(&filter, &page).await?;
    Ok(response::paginated(rows, &page, total))
}

pub async fn availability(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(path.into_inner()).await?;
    let booked = state.db.get_booked_ranges(property.id).await?;
    Ok(response::ok(serde_json::json!({
        "property_id": property.id,
        "booked": booked,
    })))
}

pub async fn create_property(
    user: AuthenticatedUser,
    req: web::Json<CreatePropertyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let images = match validate_new_property(&req) {
        Ok(images) => images,
        Err(e) => {
            warn!("Rejected listing from user {}: {}", user.id, e);
            return Err(e);
        }
    };
    let feature_ids = unique_ids(&req.features);
    check_references(&state, req.category_id, &feature_ids).await?;

    let new_property = NewProperty {
        owner_id: user.id,
        category_id: req.category_id,
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        listing_type: req.listing_type.trim().to_string(),
        price: req.price,
        address: req.address.trim().to_string(),
        city: req.city.trim().to_string(),
        country: req.country.trim().to_string(),
        latitude: req.latitude,
        longitude: req.longitude,
        bedrooms: req.bedrooms,
        bathrooms: req.bathrooms,
        area: req.area,
        max_guests: req.max_guests,
    };
    let property = state
        .db
        .create_property(&new_property, &assets(&images, &req.videos), &feature_ids)
        .await?;
    invalidate_listings(&state).await;

    info!("User {} created property {}", user.id, property.id);
    Ok(response::created(property, "Property created"))
}

pub async fn update_property(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<UpdatePropertyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let existing = state.db.require_property(path.into_inner()).await?;
    user.ensure_owner_or_admin(existing.owner_id)?;
    let req = req.into_inner();

    if let Some(price) = req.price {
        validate_price(price)?;
    }
    let listing_type = req
        .listing_type
        .as_deref()
        .map(validate_listing_type)
        .transpose()?
        .map(|t| t.as_str().to_string());
    let status = match req.status.as_deref() {
        Some(s) => Some(
            PropertyStatus::parse(s.trim())
                .ok_or_else(|| AppError::ValidationError(format!("Unknown status: {}", s)))?
                .as_str()
                .to_string(),
        ),
        None => None,
    };
    validate_coordinates(req.latitude, req.longitude)?;
    if req.title.as_deref().map_or(false, |t| t.trim().is_empty()) {
        return Err(AppError::ValidationError("Title cannot be empty".into()));
    }
    let images = req.images.as_deref().map(validate_images).transpose()?;
    let feature_ids = req.features.as_deref().map(unique_ids);
    check_references(&state, req.category_id, feature_ids.as_deref().unwrap_or_default()).await?;

    let changes = PropertyChanges {
        category_id: req.category_id,
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        listing_type,
        status,
        price: req.price,
        address: req.address,
        city: req.city,
        country: req.country,
        latitude: req.latitude,
        longitude: req.longitude,
        bedrooms: req.bedrooms,
        bathrooms: req.bathrooms,
        area: req.area,
        max_guests: req.max_guests,
    };
    let image_assets = images.as_deref().map(|images| assets(images, &[]));
    let property = state
        .db
        .update_property(existing.id, &changes, image_assets.as_deref(), feature_ids.as_deref())
        .await?;
    invalidate_listings(&state).await;

    info!("User {} updated property {}", user.id, property.id);
    Ok(response::ok_with_message(property, "Property updated"))
}

pub async fn delete_property(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let existing = state.db.require_property(path.into_inner()).await?;
    user.ensure_owner_or_admin(existing.owner_id)?;

    if !state.db.delete_property(existing.id).await? {
        return Err(AppError::NotFound("Property not found".into()));
    }
    invalidate_listings(&state).await;

    info!("User {} deleted property {}", user.id, existing.id);
    Ok(response::message("Property deleted"))
}

pub async fn upload_signature(
    _user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let cloudinary = &state.config.cloudinary;
    if !cloudinary.is_enabled() {
        return Err(AppError::ServiceUnavailable("Image uploads are not configured".into()));
    }

    let timestamp = chrono::Utc::now().timestamp();
    Ok(response::ok(UploadSignature {
        cloud_name: cloudinary.cloud_name.clone(),
        api_key: cloudinary.api_key.clone(),
        folder: UPLOAD_FOLDER.to_string(),
        timestamp,
        signature: sign_upload(UPLOAD_FOLDER, timestamp, &cloudinary.api_secret),
        signature_algorithm: "sha256",
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Literal segments first so they are not captured by `/{id}`
    cfg.service(
        web::scope("/properties")
            .route("", web::get().to(list_properties))
            .route("", web::post().to(create_property))
            .route("/search", web::get().to(search_properties))
            .route("/nearby", web::get().to(nearby_properties))
            .route("/mine", web::get().to(my_properties))
            .route("/upload-signature", web::get().to(upload_signature))
            .route("/{id}", web::get().to(get_property))
            .route("/{id}", web::put().to(update_property))
            .route("/{id}", web::delete().to(delete_property))
            .route("/{id}/availability", web::get().to(availability)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(images: usize) -> CreatePropertyRequest {
        CreatePropertyRequest {
            title: "Sea view loft".into(),
            description: "Bright loft".into(),
            listing_type: "rent".into(),
            price: 120.0,
            address: "1 Harbour St".into(),
            city: "Lisbon".into(),
            country: "Portugal".into(),
            latitude: Some(38.7),
            longitude: Some(-9.1),
            bedrooms: 2,
            bathrooms: 1,
            area: Some(70.0),
            max_guests: Some(4),
            category_id: None,
            images: (0..images).map(|i| format!("https://img.example/{}.jpg", i)).collect(),
            videos: Vec::new(),
            features: Vec::new(),
        }
    }

    #[test]
    fn test_listing_needs_six_images() {
        assert!(validate_new_property(&listing(MIN_IMAGES)).is_ok());
        assert!(validate_new_property(&listing(MIN_IMAGES - 1)).is_err());

        // Blank URLs do not count towards the minimum
        let mut req = listing(MIN_IMAGES);
        req.images[0] = "  ".into();
        assert!(validate_new_property(&req).is_err());
    }

    #[test]
    fn test_listing_field_validation() {
        let mut req = listing(MIN_IMAGES);
        req.price = 0.0;
        assert!(validate_new_property(&req).is_err());

        let mut req = listing(MIN_IMAGES);
        req.listing_type = "lease".into();
        assert!(validate_new_property(&req).is_err());

        let mut req = listing(MIN_IMAGES);
        req.latitude = Some(95.0);
        assert!(validate_new_property(&req).is_err());

        let mut req = listing(MIN_IMAGES);
        req.title = " ".into();
        assert!(validate_new_property(&req).is_err());
    }

    #[test]
    fn test_query_to_filter() {
        let query = ListingQuery {
            status: Some("available".into()),
            listing_type: Some("sale".into()),
            city: Some("  ".into()),
            min_price: Some(10.0),
            page: Some(2),
            ..Default::default()
        };
        let (filter, page) = query.to_filter().unwrap();
        assert_eq!(filter.status, Some(PropertyStatus::Available));
        assert_eq!(filter.listing_type, Some(ListingType::Sale));
        assert_eq!(filter.city, None);
        assert_eq!(page.page, 2);

        let query = ListingQuery {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert!(query.to_filter().is_err());
    }

    #[test]
    fn test_assets_keep_order_and_type() {
        let images: Vec<String> = vec!["a".into(), "b".into()];
        let videos: Vec<String> = vec!["v".into(), " ".into()];
        let assets = assets(&images, &videos);
        assert_eq!(assets.len(), 3);
        assert_eq!(assets[0].asset_type, "image");
        assert_eq!(assets[2].asset_type, "video");
    }

    #[test]
    fn test_upload_signature_is_deterministic() {
        let a = sign_upload("estatehub", 1_700_000_000, "secret");
        let b = sign_upload("estatehub", 1_700_000_000, "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sign_upload("estatehub", 1_700_000_001, "secret"));
    }

    #[test]
    fn test_unique_feature_ids() {
        let id = Uuid::new_v4();
        assert_eq!(unique_ids(&[id, id]), vec![id]);
    }
}
