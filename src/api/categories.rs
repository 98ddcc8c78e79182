use crate::api::{non_blank, response};
use crate::auth::extractor::AdminUser;
use crate::db::models::CategoryWithCount;
use crate::error::{AppError, DatabaseError};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

pub const CATEGORY_CACHE_KEY: &str = "categories:all";

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Turns a unique-name violation into a readable 400.
pub(crate) fn map_duplicate(message: &'static str) -> impl Fn(AppError) -> AppError {
    move |e| match e {
        AppError::DatabaseError(DatabaseError::Duplicate) => AppError::ValidationError(message.into()),
        other => other,
    }
}

pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    if let Some(cached) = state.cache.get::<Vec<CategoryWithCount>>(CATEGORY_CACHE_KEY).await {
        return Ok(response::ok(cached));
    }

    let categories = state.db.list_categories().await?;
    state.cache.set(CATEGORY_CACHE_KEY, &categories).await;
    Ok(response::ok(categories))
}

pub async fn get_category(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let category = state
        .db
        .get_category(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))?;
    Ok(response::ok(category))
}

pub async fn create_category(
    admin: AdminUser,
    req: web::Json<CategoryRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let name = non_blank(req.name.as_deref())
        .ok_or_else(|| AppError::ValidationError("Category name is required".into()))?;

    let category = state
        .db
        .create_category(name, non_blank(req.description.as_deref()))
        .await
        .map_err(map_duplicate("Category already exists"))?;
    state.cache.invalidate_prefix(CATEGORY_CACHE_KEY).await;

    info!("Admin {} created category {}", admin.0.id, category.name);
    Ok(response::created(category, "Category created"))
}

pub async fn update_category(
    _admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<CategoryRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
        return Err(AppError::ValidationError("Category name cannot be empty".into()));
    }

    let category = state
        .db
        .update_category(
            path.into_inner(),
            non_blank(req.name.as_deref()),
            req.description.as_deref(),
        )
        .await
        .map_err(map_duplicate("Category already exists"))?;
    state.cache.invalidate_prefix(CATEGORY_CACHE_KEY).await;

    Ok(response::ok_with_message(category, "Category updated"))
}

pub async fn delete_category(
    admin: AdminUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !state.db.delete_category(id).await? {
        return Err(AppError::NotFound("Category not found".into()));
    }
    state.cache.invalidate_prefix(CATEGORY_CACHE_KEY).await;

    info!("Admin {} deleted category {}", admin.0.id, id);
    Ok(response::message("Category deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/categories")
            .route("", web::get().to(list_categories))
            .route("", web::post().to(create_category))
            .route("/{id}", web::get().to(get_category))
            .route("/{id}", web::put().to(update_category))
            .route("/{id}", web::delete().to(delete_category)),
    );
}
