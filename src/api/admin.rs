use crate::api::{non_blank, response};
use crate::auth::extractor::AdminUser;
use crate::db::models::{
    PropertyStatus, RESERVATION_CANCELLED, RESERVATION_CONFIRMED, RESERVATION_PENDING, RESERVATION_REFUND_REQUIRED,
    ROLE_ADMIN, ROLE_USER,
};
use crate::db::search::{Page, PropertyFilter};
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct AdminListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl AdminListQuery {
    fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PropertyStatusRequest {
    pub status: String,
}

fn parse_role(role: &str) -> Result<&'static str, AppError> {
    match role.trim() {
        ROLE_USER => Ok(ROLE_USER),
        ROLE_ADMIN => Ok(ROLE_ADMIN),
        other => Err(AppError::ValidationError(format!("Unknown role: {}", other))),
    }
}

fn parse_reservation_status(status: &str) -> Result<&'static str, AppError> {
    match status.trim() {
        RESERVATION_PENDING => Ok(RESERVATION_PENDING),
        RESERVATION_CONFIRMED => Ok(RESERVATION_CONFIRMED),
        RESERVATION_CANCELLED => Ok(RESERVATION_CANCELLED),
        RESERVATION_REFUND_REQUIRED => Ok(RESERVATION_REFUND_REQUIRED),
        other => Err(AppError::ValidationError(format!("Unknown reservation status: {}", other))),
    }
}

fn parse_property_status(status: &str) -> Result<PropertyStatus, AppError> {
    PropertyStatus::parse(status.trim())
        .ok_or_else(|| AppError::ValidationError(format!("Unknown status: {}", status)))
}

fn not_self(admin: &AdminUser, target: Uuid, action: &str) -> Result<(), AppError> {
    if admin.0.id == target {
        return Err(AppError::ValidationError(format!("You cannot {} your own account", action)));
    }
    Ok(())
}

pub async fn list_users(
    _admin: AdminUser,
    query: web::Query<AdminListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let (users, total) = state
        .db
        .list_users(non_blank(query.search.as_deref()), page.limit, page.offset())
        .await?;
    Ok(response::paginated(users, &page, total))
}

pub async fn set_role(
    admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<RoleRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = path.into_inner();
    let role = parse_role(&req.role)?;
    not_self(&admin, target, "change the role of")?;

    let user = state.db.set_user_role(target, role).await?;
    info!("Admin {} set role of user {} to {}", admin.0.id, target, role);
    Ok(response::ok_with_message(user, "Role updated"))
}

pub async fn set_status(
    admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<StatusRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = path.into_inner();
    if !req.is_active {
        not_self(&admin, target, "deactivate")?;
    }

    let user = state.db.set_user_active(target, req.is_active).await?;
    info!("Admin {} set user {} active={}", admin.0.id, target, req.is_active);
    Ok(response::ok_with_message(user, "Status updated"))
}

pub async fn delete_user(
    admin: AdminUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = path.into_inner();
    not_self(&admin, target, "delete")?;

    if !state.db.delete_user(target).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    state
        .cache
        .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
        .await;

    info!("Admin {} deleted user {}", admin.0.id, target);
    Ok(response::message("User deleted"))
}

pub async fn list_properties(
    _admin: AdminUser,
    query: web::Query<AdminListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let filter = PropertyFilter {
        status: non_blank(query.status.as_deref()).map(parse_property_status).transpose()?,
        keyword: non_blank(query.search.as_deref()).map(str::to_string),
        ..Default::default()
    };
    let (rows, total) = state.db.search_properties(&filter, &page).await?;
    Ok(response::paginated(rows, &page, total))
}

pub async fn set_property_status(
    admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<PropertyStatusRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let status = parse_property_status(&req.status)?;
    let property = state.db.set_property_status(path.into_inner(), status.as_str()).await?;
    state
        .cache
        .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
        .await;

    info!("Admin {} set property {} to {}", admin.0.id, property.id, status.as_str());
    Ok(response::ok_with_message(property, "Property status updated"))
}

pub async fn list_reservations(
    _admin: AdminUser,
    query: web::Query<AdminListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let status = non_blank(query.status.as_deref())
        .map(parse_reservation_status)
        .transpose()?;
    let (reservations, total) = state
        .db
        .list_all_reservations(status, page.limit, page.offset())
        .await?;
    Ok(response::paginated(reservations, &page, total))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/users", web::get().to(list_users))
            .route("/users/{id}/role", web::patch().to(set_role))
            .route("/users/{id}/status", web::patch().to(set_status))
            .route("/users/{id}", web::delete().to(delete_user))
            .route("/properties", web::get().to(list_properties))
            .route("/properties/{id}/status", web::patch().to(set_property_status))
            .route("/reservations", web::get().to(list_reservations)),
    );
}
